mod cli;
mod logging;
mod render;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use patient_care_core::config::{self, Config};
use patient_care_core::{dosage, PatientCare, PatientForm};

use crate::cli::{Cli, Command, DetailArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.data_dir.clone())?;
    logging::init_logging(&config.log_filter, cli.verbose);
    tracing::debug!(
        version = config::APP_VERSION,
        data_dir = %config.data_dir.display(),
        "{} starting",
        config::APP_NAME
    );

    match cli.command {
        // Pure computation; no store needed
        Command::EndDate {
            start,
            quantity,
            frequency,
        } => print_end_date(&start, quantity, &frequency),
        command => {
            let mut app = PatientCare::open(config).context("Failed to open the patient store")?;
            run(&mut app, command)
        }
    }
}

fn print_end_date(start: &str, quantity: i64, frequency: &str) -> Result<()> {
    let end = PatientCare::course_end_date(start, quantity, frequency)
        .context("Cannot compute end date")?;
    println!("{end}");
    Ok(())
}

fn load_config(data_dir: Option<PathBuf>) -> Result<Config> {
    match data_dir {
        Some(dir) => {
            let mut config = Config::with_data_dir(dir);
            if let Ok(from_env) = Config::from_env() {
                config.log_filter = from_env.log_filter;
            }
            Ok(config)
        }
        None => Config::from_env().context("Failed to resolve the data directory"),
    }
}

fn run(app: &mut PatientCare, command: Command) -> Result<()> {
    match command {
        Command::Add { name, details } => {
            let form = new_form(name, details);
            let patient = app.save_patient(&form)?;
            println!("Added patient {} ({})", patient.patient_id, patient.name);
        }
        Command::Update { id, name, details } => {
            let current = app.patient_detail(id)?;
            let form = merge_form(form_from_detail(&current), name, details);
            let patient = app.update_patient(id, &form)?;
            println!("Updated patient {} ({})", patient.patient_id, patient.name);
        }
        Command::Delete { id, yes } => {
            let detail = app.patient_detail(id)?;
            let prompt = format!(
                "Delete patient {} ({}) and their {} medicine course(s)?",
                id,
                detail.patient.name,
                detail.medicines.len()
            );
            if !yes && !confirm(&prompt)? {
                println!("Cancelled.");
                return Ok(());
            }
            let report = app.delete_patient(id)?;
            println!("Deleted patient {id}.");
            for change in &report.changes {
                println!("  Patient {} is now {}", change.old_id, change.new_id);
            }
        }
        Command::List { search } => {
            let rows = match search {
                Some(term) => app.search(&term)?,
                None => app.patient_rows()?,
            };
            print!("{}", render::patient_table(&rows));
        }
        Command::Show { id } => {
            let detail = app.patient_detail(id)?;
            print!("{}", render::patient_detail(&detail, dosage::today()));
        }
        Command::Export { id, out } => {
            let path = app.export_pdf(id, out.as_deref())?;
            println!("Exported {}", path.display());
        }
        Command::Backup => {
            let summary = app.backup()?;
            println!(
                "Backup written to {} ({} patients, {} medicines, {} bytes)",
                summary.backup_path.display(),
                summary.metadata.records.patients,
                summary.metadata.records.medicines,
                summary.size_bytes
            );
        }
        Command::Backups => {
            let archives = app.list_backups()?;
            if archives.is_empty() {
                println!("No backups in {}", app.config().backups_dir().display());
            }
            for archive in archives {
                println!("{}", archive.display());
            }
        }
        Command::Restore { archive, yes } => {
            let prompt = format!(
                "Replace all current data with {}? This cannot be undone.",
                archive.display()
            );
            if !yes && !confirm(&prompt)? {
                println!("Cancelled.");
                return Ok(());
            }
            let summary = app
                .restore(&archive)
                .with_context(|| format!("Failed to restore {}", archive.display()))?;
            println!(
                "Restored backup from {} ({} patients, {} medicines)",
                summary.metadata.backup_date,
                summary.restored.patients,
                summary.restored.medicines
            );
        }
        Command::Resequence => {
            let report = app.resequence()?;
            if report.changes.is_empty() {
                println!("Patient ids already contiguous ({} patients).", report.patient_count);
            } else {
                println!(
                    "Renumbered {} of {} patients.",
                    report.changes.len(),
                    report.patient_count
                );
            }
        }
        Command::EndDate {
            start,
            quantity,
            frequency,
        } => print_end_date(&start, quantity, &frequency)?,
    }
    Ok(())
}

fn new_form(name: String, details: DetailArgs) -> PatientForm {
    merge_form(
        PatientForm {
            name,
            ..Default::default()
        },
        None,
        details,
    )
}

fn form_from_detail(detail: &patient_care_core::PatientDetail) -> PatientForm {
    let p = &detail.patient;
    PatientForm {
        name: p.name.clone(),
        age: p.age.map(|a| a.to_string()).unwrap_or_default(),
        gender: p.gender.clone().unwrap_or_default(),
        address: p.address.clone().unwrap_or_default(),
        mobile: p.mobile_number.clone().unwrap_or_default(),
        medicines: detail
            .medicines
            .iter()
            .map(|m| patient_care_core::MedicineForm {
                name: m.name.clone(),
                start_date: m.start_date.clone(),
                quantity: m.quantity.to_string(),
                frequency: m.frequency.clone(),
                end_date: Some(m.end_date.clone()),
            })
            .collect(),
    }
}

/// Overlay the flags given on the command line. Medicines replace, not append.
fn merge_form(mut form: PatientForm, name: Option<String>, details: DetailArgs) -> PatientForm {
    if let Some(name) = name {
        form.name = name;
    }
    if let Some(age) = details.age {
        form.age = age;
    }
    if let Some(gender) = details.gender {
        form.gender = gender;
    }
    if let Some(address) = details.address {
        form.address = address;
    }
    if let Some(mobile) = details.mobile {
        form.mobile = mobile;
    }
    if !details.medicines.is_empty() {
        form.medicines = details.medicines;
    }
    form
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
