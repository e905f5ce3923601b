//! Per-patient PDF report.
//!
//! Layout is computed first as plain positioned text lines (in PDF points on a
//! US Letter page) and only then rendered with `printpdf`, so pagination can be
//! tested without parsing PDF output.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use thiserror::Error;

use crate::models::PatientDetail;

/// US Letter, in points.
pub const PAGE_WIDTH_PT: f32 = 612.0;
pub const PAGE_HEIGHT_PT: f32 = 792.0;

const LEFT_PT: f32 = 50.0;
const DETAIL_INDENT_PT: f32 = 70.0;
const TOP_PT: f32 = 50.0;
/// A medicine block is never started below this line.
const BOTTOM_MARGIN_PT: f32 = 100.0;

const HEADING_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 12.0;
const DETAIL_SIZE: f32 = 10.0;
const MEDICINE_BLOCK_PT: f32 = 20.0 + 6.0 * 15.0 + 10.0;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
}

/// One positioned line of text. `y` is the baseline measured from the bottom edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub style: FontStyle,
}

struct PageCursor {
    pages: Vec<Vec<TextLine>>,
    y: f32,
}

impl PageCursor {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT_PT - TOP_PT,
        }
    }

    fn put(&mut self, text: impl Into<String>, x: f32, size: f32, style: FontStyle) {
        let line = TextLine {
            text: text.into(),
            x,
            y: self.y,
            size,
            style,
        };
        if let Some(page) = self.pages.last_mut() {
            page.push(line);
        }
    }

    fn advance(&mut self, by: f32) {
        self.y -= by;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < BOTTOM_MARGIN_PT {
            self.pages.push(Vec::new());
            self.y = PAGE_HEIGHT_PT - TOP_PT;
        }
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("N/A")
}

/// Lay out the report, one `Vec` per page.
pub fn layout_report(detail: &PatientDetail, today: NaiveDate) -> Vec<Vec<TextLine>> {
    let patient = &detail.patient;
    let mut cursor = PageCursor::new();

    cursor.put("Patient Details", LEFT_PT, HEADING_SIZE, FontStyle::Bold);
    cursor.advance(30.0);

    let age = patient
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let info = [
        format!("Patient ID: {}", patient.patient_id),
        format!("Name: {}", patient.name),
        format!("Age: {age}"),
        format!("Gender: {}", or_na(patient.gender.as_deref())),
        format!("Address: {}", or_na(patient.address.as_deref())),
        format!("Mobile Number: {}", or_na(patient.mobile_number.as_deref())),
    ];
    for line in info {
        cursor.put(line, LEFT_PT, BODY_SIZE, FontStyle::Regular);
        cursor.advance(20.0);
    }
    cursor.advance(20.0);

    cursor.put("Medicines", LEFT_PT, HEADING_SIZE, FontStyle::Bold);
    cursor.advance(30.0);

    if detail.medicines.is_empty() {
        cursor.put("No medicines prescribed.", LEFT_PT, BODY_SIZE, FontStyle::Regular);
        return cursor.pages;
    }

    for medicine in &detail.medicines {
        cursor.ensure_room(MEDICINE_BLOCK_PT);
        cursor.put(medicine.name.clone(), LEFT_PT, BODY_SIZE, FontStyle::Bold);
        cursor.advance(20.0);

        let details = [
            format!("Start Date: {}", medicine.start_date),
            format!("Quantity: {} tablets", medicine.quantity),
            format!("Frequency: {}", medicine.frequency),
            format!("End Date: {}", medicine.end_date),
            format!("Remaining Tablets: {}", medicine.remaining_tablets(today)),
            "--------------------------------".to_string(),
        ];
        for line in details {
            cursor.put(line, DETAIL_INDENT_PT, DETAIL_SIZE, FontStyle::Regular);
            cursor.advance(15.0);
        }
        cursor.advance(10.0);
    }

    cursor.pages
}

fn pt(value: f32) -> Mm {
    Mm(value * 25.4 / 72.0)
}

fn pdf_err<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> ExportError {
    move |e| ExportError::Pdf(format!("{context}: {e}"))
}

/// Render the report to PDF bytes.
pub fn render_patient_pdf(detail: &PatientDetail, today: NaiveDate) -> ExportResult<Vec<u8>> {
    let pages = layout_report(detail, today);
    let title = format!("Patient {} - {}", detail.patient.patient_id, detail.patient.name);

    let (doc, first_page, first_layer) =
        PdfDocument::new(&title, pt(PAGE_WIDTH_PT), pt(PAGE_HEIGHT_PT), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(pdf_err("font"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_err("font"))?;

    for (index, lines) in pages.iter().enumerate() {
        let (page, layer) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(pt(PAGE_WIDTH_PT), pt(PAGE_HEIGHT_PT), "Layer 1")
        };
        let layer = doc.get_page(page).get_layer(layer);
        for line in lines {
            let font = match line.style {
                FontStyle::Regular => &regular,
                FontStyle::Bold => &bold,
            };
            layer.use_text(
                line.text.as_str(),
                line.size,
                pt(line.x),
                pt(line.y),
                font,
            );
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(pdf_err("save"))?;
    buf.into_inner()
        .map_err(|e| ExportError::Pdf(format!("buffer: {e}")))
}

/// Default output path for a patient's report.
pub fn default_export_path(exports_dir: &Path, patient_id: i64) -> PathBuf {
    exports_dir.join(format!("patient_{patient_id}.pdf"))
}

/// Render and write the report, creating parent directories as needed.
pub fn export_patient_pdf(
    detail: &PatientDetail,
    output: &Path,
    today: NaiveDate,
) -> ExportResult<PathBuf> {
    let bytes = render_patient_pdf(detail, today)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &bytes)?;
    tracing::info!(
        patient_id = detail.patient.patient_id,
        path = %output.display(),
        bytes = bytes.len(),
        "Patient PDF exported"
    );
    Ok(output.to_path_buf())
}
