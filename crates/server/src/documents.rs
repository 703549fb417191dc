//! Quote document rendering and storage.
//!
//! Renders the quote to HTML via Tera and converts it with wkhtmltopdf when
//! the binary is on PATH; otherwise the HTML itself becomes the stored
//! artifact. Either way the file lands in the artifact directory served
//! under `/artifacts`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{info, warn};

use orcabot_agent::{DocumentError, DocumentIssuer, IssuedDocument};
use orcabot_core::domain::quote::format_brl;
use orcabot_core::Quote;

pub struct QuoteDocumentService {
    tera: Tera,
    wkhtmltopdf_path: Option<PathBuf>,
    artifact_dir: PathBuf,
    public_base_url: String,
    company_name: String,
}

impl QuoteDocumentService {
    pub fn new(
        artifact_dir: PathBuf,
        public_base_url: String,
        company_name: String,
    ) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&artifact_dir)?;

        let mut tera = Tera::default();
        tera.add_raw_template("quote.html.tera", include_str!("../templates/quote.html.tera"))
            .expect("embedded quote template is valid");

        let wkhtmltopdf_path = which::which("wkhtmltopdf").ok();
        match &wkhtmltopdf_path {
            Some(path) => info!(
                event_name = "documents.renderer_found",
                path = %path.display(),
            ),
            None => warn!(
                event_name = "documents.renderer_missing",
                "wkhtmltopdf not found in PATH, quote artifacts will be stored as HTML"
            ),
        }

        Ok(Self {
            tera,
            wkhtmltopdf_path,
            artifact_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            company_name,
        })
    }

    fn render_html(&self, quote: &Quote, customer_name: &str) -> Result<String, DocumentError> {
        let items: Vec<serde_json::Value> = quote
            .items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "product": item.product,
                    "quantity": item.quantity.normalize().to_string(),
                    "unit": item.unit,
                    "unit_price": format_brl(item.unit_price),
                    "line_total": format_brl(item.line_total),
                })
            })
            .collect();

        let mut context = Context::new();
        context.insert("company_name", &self.company_name);
        context.insert("customer_name", customer_name);
        context.insert("quote_number", &quote.id.0);
        context.insert("issued_at", &quote.issued_at.format("%d/%m/%Y").to_string());
        context.insert("valid_until", &quote.valid_until.format("%d/%m/%Y").to_string());
        context.insert("items", &items);
        context.insert("total", &format_brl(quote.total));
        context.insert("notes", &quote.notes);

        self.tera
            .render("quote.html.tera", &context)
            .map_err(|error| DocumentError::Render(error.to_string()))
    }

    async fn convert_to_pdf(
        &self,
        html: &str,
        pdf_path: &std::path::Path,
        renderer: &std::path::Path,
    ) -> Result<(), DocumentError> {
        let html_path =
            std::env::temp_dir().join(format!("orcamento_{}.html", uuid::Uuid::new_v4()));
        tokio::fs::write(&html_path, html)
            .await
            .map_err(|error| DocumentError::Storage(error.to_string()))?;

        let output = Command::new(renderer)
            .arg("--page-size")
            .arg("A4")
            .arg("--encoding")
            .arg("utf-8")
            .arg("--enable-local-file-access")
            .arg(&html_path)
            .arg(pdf_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|error| DocumentError::Render(error.to_string()))?;

        let _ = tokio::fs::remove_file(&html_path).await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocumentError::Render(stderr.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentIssuer for QuoteDocumentService {
    async fn render_and_store(
        &self,
        quote: &Quote,
        customer_name: &str,
    ) -> Result<IssuedDocument, DocumentError> {
        let html = self.render_html(quote, customer_name)?;

        if let Some(renderer) = self.wkhtmltopdf_path.clone() {
            let filename = format!("{}.pdf", quote.id.0);
            let pdf_path = self.artifact_dir.join(&filename);
            match self.convert_to_pdf(&html, &pdf_path, &renderer).await {
                Ok(()) => {
                    info!(event_name = "documents.pdf_stored", quote_id = %quote.id.0);
                    return Ok(IssuedDocument {
                        public_url: format!("{}/artifacts/{filename}", self.public_base_url),
                        filename,
                    });
                }
                Err(error) => {
                    warn!(
                        event_name = "documents.pdf_conversion_failed",
                        quote_id = %quote.id.0,
                        error = %error,
                        "falling back to HTML artifact"
                    );
                }
            }
        }

        let filename = format!("{}.html", quote.id.0);
        tokio::fs::write(self.artifact_dir.join(&filename), &html)
            .await
            .map_err(|error| DocumentError::Storage(error.to_string()))?;

        info!(event_name = "documents.html_stored", quote_id = %quote.id.0);
        Ok(IssuedDocument {
            public_url: format!("{}/artifacts/{filename}", self.public_base_url),
            filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use orcabot_agent::DocumentIssuer;
    use orcabot_core::domain::lead::LeadId;
    use orcabot_core::{Quote, QuoteLineItem};

    use super::QuoteDocumentService;

    fn quote() -> Quote {
        let issued_at = Utc.with_ymd_and_hms(2025, 1, 14, 12, 0, 0).unwrap();
        let items = vec![QuoteLineItem::new(
            "Telha Sanduíche 30mm",
            Decimal::TEN,
            "METROS",
            Decimal::new(4413, 2),
        )
        .expect("line")];
        Quote::issue(LeadId("lead-1".to_string()), items, issued_at, 7, None).expect("quote")
    }

    #[tokio::test]
    async fn html_artifact_is_stored_and_addressable_without_a_renderer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut service = QuoteDocumentService::new(
            dir.path().to_path_buf(),
            "http://localhost:8000/".to_string(),
            "Telhas & Cia".to_string(),
        )
        .expect("service");
        service.wkhtmltopdf_path = None;

        let quote = quote();
        let document =
            service.render_and_store(&quote, "Marcos").await.expect("artifact stored");

        assert_eq!(document.filename, format!("{}.html", quote.id.0));
        assert_eq!(
            document.public_url,
            format!("http://localhost:8000/artifacts/{}.html", quote.id.0),
        );

        let stored = std::fs::read_to_string(dir.path().join(&document.filename))
            .expect("artifact readable");
        assert!(stored.contains(&quote.id.0));
        assert!(stored.contains("Marcos"));
        assert!(stored.contains("Telha Sanduíche 30mm"));
        assert!(stored.contains("441,30"));
        assert!(stored.contains("14/01/2025"));
    }

    #[tokio::test]
    async fn missing_artifact_directory_is_created_on_construction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("artifacts").join("quotes");

        QuoteDocumentService::new(
            nested.clone(),
            "http://localhost:8000".to_string(),
            "Telhas & Cia".to_string(),
        )
        .expect("service");

        assert!(nested.is_dir());
    }
}
