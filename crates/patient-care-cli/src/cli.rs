use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use patient_care_core::MedicineForm;

/// Patient Care command-line arguments
#[derive(Debug, Parser)]
#[command(
    name = "patientcare",
    version,
    about = "Track patients and their medicine courses"
)]
pub struct Cli {
    /// Data directory holding the store, backups and exports
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a patient with at least one medicine course
    Add {
        #[arg(long)]
        name: String,

        #[command(flatten)]
        details: DetailArgs,
    },

    /// Update a patient; medicines given here replace all existing courses
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        details: DetailArgs,
    },

    /// Delete a patient and renumber the rest
    Delete {
        id: i64,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List patients with their courses
    List {
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one patient in full
    Show { id: i64 },

    /// Write a patient's PDF report
    Export {
        id: i64,

        /// Output file (default: <data-dir>/exports/patient_<id>.pdf)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Archive the store into the backups directory
    Backup,

    /// List existing backup archives
    Backups,

    /// Replace the store with an archived copy
    Restore {
        archive: PathBuf,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Compact patient ids to 1..n
    Resequence,

    /// Compute the end date of a course
    EndDate {
        /// Start date, YYYY-MM-DD
        #[arg(long)]
        start: String,

        #[arg(long)]
        quantity: i64,

        /// OD, BD, TDS or QID
        #[arg(long)]
        frequency: String,
    },
}

/// Optional patient fields shared by `add` and `update`.
#[derive(Debug, Args, Default)]
pub struct DetailArgs {
    #[arg(long)]
    pub age: Option<String>,

    #[arg(long)]
    pub gender: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    /// 10 digits
    #[arg(long)]
    pub mobile: Option<String>,

    /// NAME,START,QTY,FREQ[,END] (repeatable)
    #[arg(long = "medicine", value_parser = parse_medicine)]
    pub medicines: Vec<MedicineForm>,
}

/// Parse `NAME,START,QTY,FREQ[,END]` into a form row. Field checks happen later.
pub fn parse_medicine(value: &str) -> Result<MedicineForm, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [name, start, quantity, frequency] => Ok(MedicineForm {
            name: name.to_string(),
            start_date: start.to_string(),
            quantity: quantity.to_string(),
            frequency: frequency.to_string(),
            end_date: None,
        }),
        [name, start, quantity, frequency, end] => Ok(MedicineForm {
            name: name.to_string(),
            start_date: start.to_string(),
            quantity: quantity.to_string(),
            frequency: frequency.to_string(),
            end_date: Some(end.to_string()).filter(|e| !e.is_empty()),
        }),
        _ => Err(format!(
            "expected NAME,START,QTY,FREQ[,END], got {value:?}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_medicine() {
        let form = parse_medicine("Paracetamol, 2024-01-01, 10, BD").unwrap();
        assert_eq!(form.name, "Paracetamol");
        assert_eq!(form.quantity, "10");
        assert_eq!(form.end_date, None);

        let form = parse_medicine("Metformin,2024-01-01,30,OD,2024-02-15").unwrap();
        assert_eq!(form.end_date.as_deref(), Some("2024-02-15"));

        let form = parse_medicine("Metformin,2024-01-01,30,OD,").unwrap();
        assert_eq!(form.end_date, None);

        assert!(parse_medicine("Metformin,2024-01-01").is_err());
        assert!(parse_medicine("a,b,c,d,e,f").is_err());
    }

    #[test]
    fn test_add_with_medicines() {
        let cli = Cli::try_parse_from([
            "patientcare",
            "add",
            "--name",
            "asha rao",
            "--mobile",
            "9876543210",
            "--medicine",
            "Paracetamol,2024-01-01,10,BD",
            "--medicine",
            "Metformin,2024-01-01,30,OD",
        ])
        .unwrap();
        match cli.command {
            Command::Add { name, details } => {
                assert_eq!(name, "asha rao");
                assert_eq!(details.medicines.len(), 2);
                assert_eq!(details.mobile.as_deref(), Some("9876543210"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["patientcare", "list", "--search", "rao", "-v", "--data-dir", "/tmp/pc"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/pc")));
        assert!(matches!(cli.command, Command::List { search: Some(ref s) } if s == "rao"));
    }

    #[test]
    fn test_bad_medicine_rejected() {
        let result = Cli::try_parse_from(["patientcare", "add", "--name", "x", "--medicine", "oops"]);
        assert!(result.is_err());
    }
}
