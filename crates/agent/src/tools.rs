//! Tool menu and router: maps a model-requested tool name plus a loosely
//! typed argument bag onto the corresponding leaf operation, normalizing the
//! result into a uniform envelope. Tool names and payload keys stay in pt-BR;
//! they are part of the conversational contract with the model.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use orcabot_catalog::Catalog;
use orcabot_core::domain::lead::LeadId;
use orcabot_core::domain::quote::format_brl;
use orcabot_db::repositories::{LeadRepository, QuoteRepository};
use orcabot_whatsapp::ChatGateway;

use crate::documents::DocumentIssuer;
use crate::llm::ToolSpec;
use crate::runtime::AgentSettings;

pub const CONSULTAR_PRECOS: &str = "consultar_precos";
pub const GERAR_ORCAMENTO: &str = "gerar_orcamento";
pub const NOTIFICAR_GESTOR: &str = "notificar_gestor";

pub const KNOWN_TOOLS: &[&str] = &[CONSULTAR_PRECOS, GERAR_ORCAMENTO, NOTIFICAR_GESTOR];

/// Ephemeral per-turn facts the tools need. Owned by the loop, discarded
/// with the turn.
#[derive(Clone, Debug)]
pub struct TurnContext {
    pub lead_id: LeadId,
    pub phone: String,
    pub lead_name: Option<String>,
    pub has_quote: bool,
}

/// Uniform tool result fed back into the transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutcome {
    pub success: bool,
    /// Serialized JSON payload, exactly what the model sees.
    pub payload: String,
}

impl ToolOutcome {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self { success: true, payload: payload.to_string() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, payload: json!({ "erro": message.into() }).to_string() }
    }
}

/// Declared tool menu for one turn. Quote issuance is structurally withdrawn
/// once the lead has a quote; that withdrawal, not the tool itself, is what
/// makes issuance idempotent per lead.
pub fn tool_menu(has_quote: bool) -> Vec<ToolSpec> {
    let mut menu = vec![ToolSpec {
        name: CONSULTAR_PRECOS,
        description: "Consulta a tabela de preços de produtos. Use SOMENTE quando o cliente \
                      perguntar explicitamente sobre preço, valor ou produto específico, ou \
                      quando for montar um orçamento a pedido do cliente. NÃO use para \
                      saudações ou mensagens genéricas. Retorna lista com produto, unidade e \
                      preço unitário."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "busca": {
                    "type": "string",
                    "description": "Termo de busca para encontrar o produto. Ex: 'telha galvalume', 'metalon', 'calha'. Seja genérico para buscar múltiplos resultados.",
                },
            },
            "required": ["busca"],
        }),
    }];

    if !has_quote {
        menu.push(ToolSpec {
            name: GERAR_ORCAMENTO,
            description: "Gera um orçamento em PDF e o envia ao cliente pelo WhatsApp. Use \
                          somente quando o cliente confirmar os itens e quantidades que \
                          deseja."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "nome_cliente": {
                        "type": "string",
                        "description": "Nome completo ou primeiro nome do cliente.",
                    },
                    "itens": {
                        "type": "array",
                        "description": "Lista de itens do orçamento.",
                        "items": {
                            "type": "object",
                            "properties": {
                                "produto": { "type": "string", "description": "Nome exato do produto conforme a tabela." },
                                "quantidade": { "type": "number", "description": "Quantidade solicitada." },
                                "unidade": { "type": "string", "description": "Unidade de medida (UNIDADE, METROS, KG)." },
                                "preco_unitario": { "type": "number", "description": "Preço unitário em reais." },
                            },
                            "required": ["produto", "quantidade", "unidade", "preco_unitario"],
                        },
                    },
                    "observacoes": {
                        "type": "string",
                        "description": "Observações adicionais para o orçamento (opcional).",
                    },
                },
                "required": ["nome_cliente", "itens"],
            }),
        });
    }

    menu.push(ToolSpec {
        name: NOTIFICAR_GESTOR,
        description: "Notifica o gestor de vendas via WhatsApp com um resumo do lead e \
                      orçamento. Use quando o cliente demonstrar interesse em fechar negócio \
                      ou pedir negociação."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "nome_cliente": { "type": "string", "description": "Nome do cliente." },
                "telefone_cliente": { "type": "string", "description": "Telefone do cliente." },
                "resumo_interesse": { "type": "string", "description": "Resumo do que o cliente quer comprar e contexto da conversa." },
                "valor_orcamento": { "type": "number", "description": "Valor total do orçamento em reais (0 se ainda não foi gerado)." },
                "pdf_url": { "type": "string", "description": "URL do PDF do orçamento (vazio se não gerado ainda)." },
            },
            "required": ["nome_cliente", "resumo_interesse"],
        }),
    });

    menu
}

#[derive(Debug, Default, Deserialize)]
struct ConsultarPrecosArgs {
    #[serde(default)]
    busca: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemArgs {
    pub produto: String,
    pub quantidade: Decimal,
    #[serde(default = "default_unit")]
    pub unidade: String,
    pub preco_unitario: Decimal,
}

fn default_unit() -> String {
    "UNIDADE".to_string()
}

/// Issuance arguments, including the simplified shape some models emit
/// (`produto` + `metragem`) instead of the declared `itens` array.
#[derive(Debug, Default, Deserialize)]
struct GerarOrcamentoArgs {
    #[serde(default)]
    nome_cliente: String,
    #[serde(default)]
    itens: Vec<ItemArgs>,
    #[serde(default)]
    observacoes: Option<String>,
    #[serde(default)]
    produto: Option<String>,
    #[serde(default)]
    tipo_obra: Option<String>,
    #[serde(default)]
    metragem: Option<serde_json::Value>,
    #[serde(default)]
    quantidade: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificarGestorArgs {
    #[serde(default)]
    nome_cliente: String,
    #[serde(default)]
    telefone_cliente: Option<String>,
    #[serde(default)]
    resumo_interesse: String,
    #[serde(default)]
    valor_orcamento: Option<Decimal>,
    #[serde(default)]
    pdf_url: Option<String>,
}

/// Executes tool calls against the leaf services. Cloneable so a round's
/// calls can run on separate tasks.
#[derive(Clone)]
pub struct ToolRouter {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) leads: Arc<dyn LeadRepository>,
    pub(crate) quotes: Arc<dyn QuoteRepository>,
    pub(crate) gateway: Arc<dyn ChatGateway>,
    pub(crate) documents: Arc<dyn DocumentIssuer>,
    pub(crate) settings: AgentSettings,
}

impl ToolRouter {
    pub fn new(
        catalog: Arc<Catalog>,
        leads: Arc<dyn LeadRepository>,
        quotes: Arc<dyn QuoteRepository>,
        gateway: Arc<dyn ChatGateway>,
        documents: Arc<dyn DocumentIssuer>,
        settings: AgentSettings,
    ) -> Self {
        Self { catalog, leads, quotes, gateway, documents, settings }
    }

    /// Never fails: every problem becomes an error envelope the model can
    /// read and react to.
    pub async fn dispatch(&self, name: &str, raw_args: &str, ctx: &TurnContext) -> ToolOutcome {
        info!(event_name = "tool.dispatch", tool = name, lead_id = %ctx.lead_id.0);

        match name {
            CONSULTAR_PRECOS => self.consultar_precos(raw_args).await,
            GERAR_ORCAMENTO => self.gerar_orcamento(raw_args, ctx).await,
            NOTIFICAR_GESTOR => self.notificar_gestor(raw_args, ctx).await,
            _ => {
                warn!(event_name = "tool.unknown", tool = name);
                ToolOutcome::error(format!("Tool '{name}' não reconhecida."))
            }
        }
    }

    async fn consultar_precos(&self, raw_args: &str) -> ToolOutcome {
        let args: ConsultarPrecosArgs = decode_args(raw_args);

        match self.catalog.search(&args.busca).await {
            Ok(hits) if hits.is_empty() => ToolOutcome::ok(json!({
                "encontrados": 0,
                "mensagem": format!(
                    "Nenhum produto encontrado para '{}'. Tente um termo mais genérico.",
                    args.busca,
                ),
                "produtos": [],
            })),
            Ok(hits) => {
                let produtos: Vec<serde_json::Value> = hits
                    .iter()
                    .map(|entry| {
                        json!({
                            "produto": entry.product,
                            "unidade": entry.unit,
                            "preco": entry.unit_price,
                        })
                    })
                    .collect();
                ToolOutcome::ok(json!({
                    "encontrados": produtos.len(),
                    "busca": args.busca,
                    "produtos": produtos,
                }))
            }
            Err(err) => {
                error!(event_name = "tool.catalog_failed", error = %err);
                ToolOutcome::error("Não consegui acessar a tabela de preços agora. Tente novamente.")
            }
        }
    }

    async fn gerar_orcamento(&self, raw_args: &str, ctx: &TurnContext) -> ToolOutcome {
        let args: GerarOrcamentoArgs = decode_args(raw_args);

        let customer_name = if args.nome_cliente.trim().is_empty() {
            ctx.lead_name.clone().unwrap_or_else(|| "Cliente".to_string())
        } else {
            args.nome_cliente.clone()
        };

        let items = if args.itens.is_empty() {
            match self.recover_simplified_items(&args).await {
                Ok(items) => items,
                Err(outcome) => return outcome,
            }
        } else {
            args.itens
        };

        self.issue_quote(&customer_name, items, args.observacoes.clone(), ctx).await
    }

    /// Best-effort recovery for the simplified `{produto, metragem}` shape:
    /// re-resolve the product against the catalog, strip unit suffixes from
    /// the quantity, and synthesize a single line item.
    async fn recover_simplified_items(
        &self,
        args: &GerarOrcamentoArgs,
    ) -> Result<Vec<ItemArgs>, ToolOutcome> {
        let product_name = args
            .produto
            .as_deref()
            .or(args.tipo_obra.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let raw_quantity = args.metragem.as_ref().or(args.quantidade.as_ref());

        let (Some(product_name), Some(raw_quantity)) = (product_name, raw_quantity) else {
            return Err(ToolOutcome::error(
                "Nenhum item fornecido para o orçamento e parâmetros simplificados incompletos.",
            ));
        };

        info!(event_name = "tool.simplified_args", produto = product_name);

        let hits = match self.catalog.search(product_name).await {
            Ok(hits) => hits,
            Err(err) => {
                error!(event_name = "tool.catalog_failed", error = %err);
                return Err(ToolOutcome::error(
                    "Não consegui acessar a tabela de preços agora. Tente novamente.",
                ));
            }
        };

        let Some(entry) = hits.into_iter().next() else {
            return Err(ToolOutcome::error(format!(
                "Não encontrei o produto '{product_name}' na tabela para gerar o orçamento.",
            )));
        };

        Ok(vec![ItemArgs {
            produto: entry.product,
            quantidade: parse_loose_quantity(raw_quantity),
            unidade: entry.unit,
            preco_unitario: entry.unit_price,
        }])
    }

    async fn notificar_gestor(&self, raw_args: &str, ctx: &TurnContext) -> ToolOutcome {
        let mut args: NotificarGestorArgs = decode_args(raw_args);

        if args.nome_cliente.trim().is_empty() {
            args.nome_cliente = ctx.lead_name.clone().unwrap_or_else(|| "Cliente".to_string());
        }
        let customer_phone =
            args.telefone_cliente.clone().unwrap_or_else(|| ctx.phone.clone());

        // Backfill value and document from the latest stored quote.
        let needs_value = args.valor_orcamento.unwrap_or(Decimal::ZERO) <= Decimal::ZERO;
        let needs_url = args.pdf_url.as_deref().map(str::is_empty).unwrap_or(true);
        if needs_value || needs_url {
            if let Ok(Some(quote)) = self.quotes.find_latest_for_lead(&ctx.lead_id).await {
                if needs_value {
                    args.valor_orcamento = Some(quote.total);
                }
                if needs_url {
                    args.pdf_url = quote.document_url.clone();
                }
            }
        }

        match self
            .notify_manager(
                &args.nome_cliente,
                &customer_phone,
                &args.resumo_interesse,
                args.valor_orcamento,
                args.pdf_url.as_deref(),
            )
            .await
        {
            Ok(()) => ToolOutcome::ok(json!({
                "sucesso": true,
                "mensagem": "Gestor notificado com sucesso.",
            })),
            Err(message) => ToolOutcome::error(message),
        }
    }

    /// Delivers the escalation summary to the manager's WhatsApp. Also used
    /// by the issuance pipeline after a quote goes out.
    pub(crate) async fn notify_manager(
        &self,
        customer_name: &str,
        customer_phone: &str,
        summary: &str,
        quoted_value: Option<Decimal>,
        document_url: Option<&str>,
    ) -> Result<(), String> {
        let Some(manager_phone) = self.settings.manager_phone.as_deref() else {
            return Err("Nenhum telefone de gestor configurado para notificação.".to_string());
        };

        let value_line = match quoted_value.filter(|value| *value > Decimal::ZERO) {
            Some(value) => format!("R$ {}", format_brl(value)),
            None => "Não gerado ainda".to_string(),
        };

        let mut message = format!(
            "🔔 *NOVO LEAD QUENTE!*\n\n\
             👤 *Cliente:* {customer_name}\n\
             📱 *Telefone:* {customer_phone}\n\
             💰 *Valor orçado:* {value_line}\n\n\
             📋 *Interesse:*\n{summary}\n\n",
        );
        if let Some(url) = document_url.filter(|url| !url.is_empty()) {
            message.push_str(&format!("📄 *PDF:* {url}\n\n"));
        }
        message.push_str(&format!(
            "_Atendido pela {} • {}_",
            self.settings.agent_name,
            chrono::Utc::now().format("%d/%m/%Y %H:%M"),
        ));

        self.gateway
            .send_text(manager_phone, &message)
            .await
            .map_err(|err| format!("Falha ao notificar gestor: {err}"))?;

        if let Some(url) = document_url.filter(|url| !url.is_empty()) {
            self.gateway
                .send_document(
                    manager_phone,
                    url,
                    &format!("Orçamento do cliente {customer_name}"),
                    &format!("Orcamento_{}.pdf", customer_name.replace(' ', "_")),
                )
                .await
                .map_err(|err| format!("Falha ao enviar PDF ao gestor: {err}"))?;
        }

        info!(event_name = "tool.manager_notified", customer = customer_name);
        Ok(())
    }
}

/// Malformed argument payloads decode to defaults rather than failing the
/// call; the individual tool then reports what is actually missing.
fn decode_args<T: Default + for<'de> Deserialize<'de>>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(event_name = "tool.bad_args", error = %err);
        T::default()
    })
}

/// `"50m"`, `"12,5 m2"`, `50` → a usable quantity; unparseable → 1.
fn parse_loose_quantity(raw: &serde_json::Value) -> Decimal {
    let text = match raw {
        serde_json::Value::String(value) => value.clone(),
        serde_json::Value::Number(value) => value.to_string(),
        _ => return Decimal::ONE,
    };

    let cleaned: String =
        text.chars().filter(|ch| ch.is_ascii_digit() || *ch == ',' || *ch == '.').collect();
    let normalized = cleaned.replace(',', ".");

    match Decimal::from_str(&normalized) {
        Ok(value) if value > Decimal::ZERO => value,
        _ => Decimal::ONE,
    }
}
