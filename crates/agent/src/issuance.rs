//! Quote issuance pipeline: validate, price, persist, render, deliver.
//!
//! Ordering matters. The quote row is persisted before any delivery attempt,
//! and document rendering failure downgrades to a quote without a document
//! instead of aborting. Only argument validation and the database write can
//! fail the whole operation.

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use orcabot_core::domain::lead::LeadStatus;
use orcabot_core::domain::quote::format_brl;
use orcabot_core::{Quote, QuoteLineItem};

use crate::tools::{ItemArgs, ToolOutcome, ToolRouter, TurnContext};

impl ToolRouter {
    pub(crate) async fn issue_quote(
        &self,
        customer_name: &str,
        items: Vec<ItemArgs>,
        notes: Option<String>,
        ctx: &TurnContext,
    ) -> ToolOutcome {
        let mut line_items = Vec::with_capacity(items.len());
        for item in items {
            match QuoteLineItem::new(
                item.produto,
                item.quantidade,
                item.unidade,
                item.preco_unitario,
            ) {
                Ok(line) => line_items.push(line),
                Err(err) => {
                    warn!(event_name = "quote.invalid_item", error = %err);
                    return ToolOutcome::error(format!("Item inválido no orçamento: {err}"));
                }
            }
        }

        let mut quote = match Quote::issue(
            ctx.lead_id.clone(),
            line_items,
            Utc::now(),
            self.settings.quote_validity_days,
            notes,
        ) {
            Ok(quote) => quote,
            Err(err) => return ToolOutcome::error(format!("Não foi possível montar o orçamento: {err}")),
        };

        // Render before persisting so the stored row already carries its URL.
        // A render failure is logged and the quote goes out without a link.
        match self.documents.render_and_store(&quote, customer_name).await {
            Ok(document) => quote.document_url = Some(document.public_url),
            Err(err) => {
                error!(event_name = "quote.document_failed", quote_id = %quote.id.0, error = %err);
            }
        }

        if let Err(err) = self.quotes.save(quote.clone()).await {
            error!(event_name = "quote.persist_failed", quote_id = %quote.id.0, error = %err);
            return ToolOutcome::error("Não foi possível salvar o orçamento. Tente novamente.");
        }

        self.mark_lead_quoted(ctx).await;

        if let Some(url) = quote.document_url.as_deref() {
            let caption = format!(
                "📄 Orçamento {} - {}\nTotal: R$ {}\nVálido até {}",
                quote.id.0,
                self.settings.company_name,
                format_brl(quote.total),
                quote.valid_until.format("%d/%m/%Y"),
            );
            let filename = format!("Orcamento_{}.pdf", customer_name.replace(' ', "_"));
            if let Err(err) = self.gateway.send_document(&ctx.phone, url, &caption, &filename).await
            {
                error!(event_name = "quote.delivery_failed", quote_id = %quote.id.0, error = %err);
                return ToolOutcome::error(
                    "O orçamento foi registrado mas não consegui enviar o documento. \
                     Tente novamente em instantes.",
                );
            }
        }

        // Manager heads-up is best-effort; a quoted customer never waits on it.
        if let Err(reason) = self
            .notify_manager(
                customer_name,
                &ctx.phone,
                &format!("Orçamento {} gerado e enviado ao cliente.", quote.id.0),
                Some(quote.total),
                quote.document_url.as_deref(),
            )
            .await
        {
            warn!(event_name = "quote.manager_notify_failed", reason = %reason);
        }

        info!(
            event_name = "quote.issued",
            quote_id = %quote.id.0,
            lead_id = %ctx.lead_id.0,
            total = %quote.total,
            has_document = quote.document_url.is_some(),
        );

        let mensagem = if quote.document_url.is_some() {
            format!("Orçamento {} enviado ao cliente em PDF.", quote.id.0)
        } else {
            format!(
                "Orçamento {} registrado, mas o PDF não pôde ser gerado. Informe os valores ao cliente pelo chat.",
                quote.id.0,
            )
        };

        ToolOutcome::ok(json!({
            "sucesso": true,
            "numero": quote.id.0,
            "valor_total": quote.total,
            "pdf_url": quote.document_url,
            "validade": quote.valid_until.format("%d/%m/%Y").to_string(),
            "mensagem": mensagem,
        }))
    }

    async fn mark_lead_quoted(&self, ctx: &TurnContext) {
        let lead = match self.leads.find_by_id(&ctx.lead_id).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                warn!(event_name = "quote.lead_missing", lead_id = %ctx.lead_id.0);
                return;
            }
            Err(err) => {
                warn!(event_name = "quote.lead_load_failed", error = %err);
                return;
            }
        };

        if lead.status == LeadStatus::Quoted {
            return;
        }

        let mut lead = lead;
        if lead.transition_to(LeadStatus::Quoted).is_ok() {
            lead.awaiting_quote_confirmation = false;
            if let Err(err) = self.leads.save(lead).await {
                warn!(event_name = "quote.lead_save_failed", error = %err);
            }
        }
    }
}
