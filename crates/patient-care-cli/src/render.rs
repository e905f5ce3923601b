//! Plain-text rendering for terminal output.

use chrono::NaiveDate;
use patient_care_core::{Highlight, PatientDetail, PatientRow};

const HEADERS: [&str; 11] = [
    "ID", "Name", "Age", "Gender", "Mobile", "Medicine", "Start", "Qty", "Freq", "End", "Left",
];

fn marker(highlight: Highlight) -> &'static str {
    match highlight {
        Highlight::Critical => "!!",
        Highlight::Warning => "! ",
        Highlight::Normal => "  ",
    }
}

fn cells(row: &PatientRow) -> [String; 11] {
    let p = &row.patient;
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let (medicine, start, qty, freq, end) = match &row.medicine {
        Some(m) => (
            m.name.clone(),
            m.start_date.clone(),
            m.quantity.to_string(),
            m.frequency.clone(),
            m.end_date.clone(),
        ),
        None => Default::default(),
    };
    [
        p.patient_id.to_string(),
        p.name.clone(),
        p.age.map(|a| a.to_string()).unwrap_or_default(),
        opt(&p.gender),
        opt(&p.mobile_number),
        medicine,
        start,
        qty,
        freq,
        end,
        row.remaining.to_string(),
    ]
}

/// Render listing rows as an aligned table.
///
/// Rows are prefixed with `!!` when stock is critical and `!` when low.
pub fn patient_table(rows: &[PatientRow]) -> String {
    if rows.is_empty() {
        return "No patients.\n".to_string();
    }

    let body: Vec<[String; 11]> = rows.iter().map(cells).collect();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for line in &body {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |prefix: &str, values: &[String]| {
        let padded: Vec<String> = values
            .iter()
            .zip(widths)
            .map(|(v, w)| format!("{v:<w$}"))
            .collect();
        format!("{prefix} {}", padded.join("  ")).trim_end().to_string() + "\n"
    };

    let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    let mut out = format_line("  ", &header);
    for (row, line) in rows.iter().zip(&body) {
        out.push_str(&format_line(marker(row.highlight), line));
    }
    out
}

/// Render one patient with every course.
pub fn patient_detail(detail: &PatientDetail, today: NaiveDate) -> String {
    let p = &detail.patient;
    let na = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
    let mut out = format!(
        "Patient ID: {}\nName: {}\nAge: {}\nGender: {}\nAddress: {}\nMobile Number: {}\nEntered: {}\n",
        p.patient_id,
        p.name,
        p.age.map(|a| a.to_string()).unwrap_or_else(|| "N/A".to_string()),
        na(&p.gender),
        na(&p.address),
        na(&p.mobile_number),
        p.entry_date,
    );

    if detail.medicines.is_empty() {
        out.push_str("\nNo medicines prescribed.\n");
        return out;
    }
    for m in &detail.medicines {
        out.push_str(&format!(
            "\n{}\n  Start Date: {}\n  Quantity: {} tablets\n  Frequency: {}\n  End Date: {}\n  Remaining Tablets: {}\n",
            m.name,
            m.start_date,
            m.quantity,
            m.frequency,
            m.end_date,
            m.remaining_tablets(today),
        ));
    }
    out
}
