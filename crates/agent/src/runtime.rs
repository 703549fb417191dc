//! Conversation runtime: one inbound WhatsApp message in, at most one reply
//! out. Runs the bounded reasoning loop (classify, call the model, dispatch
//! tools, repeat) and owns all turn-level persistence. Turns for the same
//! phone are serialized; different leads proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use orcabot_core::domain::lead::{Lead, LeadId, LeadStatus};
use orcabot_core::domain::message::{Message, MessageId, MessageRole};
use orcabot_core::domain::quote::format_brl;
use orcabot_core::{ApplicationError, InterfaceError};
use orcabot_db::repositories::{
    LeadRepository, MessageRepository, QuoteRepository, RepositoryError,
};
use orcabot_whatsapp::{mask_phone, ChatGateway};

use crate::classify::{classify_turn, offers_quote, ToolPosture};
use crate::extract::{extract_tool_call, sanitize_reply};
use crate::llm::{
    ChatRequest, LlmError, ReasoningClient, ToolCallRequest, ToolChoice, TranscriptEntry,
};
use crate::tools::{
    tool_menu, ToolOutcome, ToolRouter, TurnContext, GERAR_ORCAMENTO, KNOWN_TOOLS,
};

/// Hard ceiling on model calls per turn. A loop that has not finalized by
/// then answers with a placeholder rather than an error.
pub const MAX_REASONING_ROUNDS: usize = 8;

/// Sent when the round budget runs out with tools still in flight.
pub const PROCESSING_PLACEHOLDER: &str = "Oi! Estou finalizando o processamento, só um segundo! 😊";

#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub agent_name: String,
    pub company_name: String,
    pub manager_phone: Option<String>,
    pub quote_validity_days: i64,
    pub max_history_messages: u32,
}

/// A webhook-extracted customer message, ready for the runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundTurn {
    pub phone: String,
    pub text: String,
    pub sender_name: Option<String>,
}

#[derive(Debug, Error)]
enum TurnError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Reasoning(#[from] LlmError),
}

impl TurnError {
    /// Maps the turn failure onto the interface-error taxonomy; the customer
    /// only ever sees `user_message()`, never the underlying detail.
    fn into_interface(self, correlation_id: &str) -> InterfaceError {
        let application = match self {
            Self::Repository(err) => ApplicationError::Persistence(err.to_string()),
            Self::Reasoning(err) => ApplicationError::Integration(err.to_string()),
        };
        application.into_interface(correlation_id)
    }
}

pub struct AgentRuntime {
    leads: Arc<dyn LeadRepository>,
    messages: Arc<dyn MessageRepository>,
    quotes: Arc<dyn QuoteRepository>,
    reasoning: Arc<dyn ReasoningClient>,
    gateway: Arc<dyn ChatGateway>,
    router: ToolRouter,
    settings: AgentSettings,
    turn_locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        leads: Arc<dyn LeadRepository>,
        messages: Arc<dyn MessageRepository>,
        quotes: Arc<dyn QuoteRepository>,
        reasoning: Arc<dyn ReasoningClient>,
        gateway: Arc<dyn ChatGateway>,
        router: ToolRouter,
        settings: AgentSettings,
    ) -> Self {
        Self {
            leads,
            messages,
            quotes,
            reasoning,
            gateway,
            router,
            settings,
            turn_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Processes one customer message end to end. Infallible from the
    /// caller's perspective: failures are logged and answered with the
    /// fallback message.
    pub async fn handle_inbound(&self, turn: InboundTurn) {
        let lock = self.turn_lock(&turn.phone);
        let _serialized = lock.lock().await;

        if let Err(err) = self.run_turn(&turn).await {
            let correlation_id = Uuid::new_v4().to_string();
            error!(
                event_name = "agent.turn_failed",
                phone = %mask_phone(&turn.phone),
                correlation_id = %correlation_id,
                error = %err,
            );
            let fallback = err.into_interface(&correlation_id);
            if let Err(send_err) =
                self.gateway.send_text(&turn.phone, fallback.user_message()).await
            {
                error!(event_name = "agent.fallback_failed", error = %send_err);
            }
        }
    }

    async fn run_turn(&self, turn: &InboundTurn) -> Result<(), TurnError> {
        let lead = self.load_or_create_lead(turn).await?;
        self.messages.append(new_message(&lead.id, MessageRole::Customer, &turn.text)).await?;

        let has_quote = self.quotes.has_quote_for_lead(&lead.id).await?;
        let posture = classify_turn(&turn.text, has_quote, lead.awaiting_quote_confirmation);
        info!(
            event_name = "agent.turn_started",
            phone = %mask_phone(&turn.phone),
            posture = ?posture,
            has_quote,
        );

        // Typing indicator while the model thinks; dropped if it fails.
        {
            let gateway = Arc::clone(&self.gateway);
            let phone = turn.phone.clone();
            tokio::spawn(async move {
                gateway.send_typing(&phone, Duration::from_millis(1_500)).await;
            });
        }

        let history =
            self.messages.list_recent(&lead.id, self.settings.max_history_messages).await?;
        let mut transcript: Vec<TranscriptEntry> = history
            .iter()
            .filter(|message| message.role.replayed_in_transcript())
            .map(|message| match message.role {
                MessageRole::Customer => TranscriptEntry::Customer(message.text.clone()),
                _ => TranscriptEntry::Assistant(message.text.clone()),
            })
            .collect();

        let mut ctx = TurnContext {
            lead_id: lead.id.clone(),
            phone: turn.phone.clone(),
            lead_name: lead.name.clone(),
            has_quote,
        };

        let Some(reply) = self.agent_loop(&mut ctx, posture, &mut transcript, &lead).await? else {
            warn!(event_name = "agent.turn_aborted", phone = %mask_phone(&turn.phone));
            return Ok(());
        };

        self.messages.append(new_message(&lead.id, MessageRole::Assistant, &reply)).await?;
        self.update_offer_flag(&lead.id, &reply, ctx.has_quote).await?;

        if let Err(err) = self.gateway.deliver_humanized(&turn.phone, &reply).await {
            // The reply is already persisted, so the next turn keeps context.
            error!(
                event_name = "agent.delivery_failed",
                phone = %mask_phone(&turn.phone),
                error = %err,
            );
        }
        Ok(())
    }

    /// The bounded reasoning loop. Returns the final reply text, or `None`
    /// when the turn aborts (model produced neither text nor tool calls).
    async fn agent_loop(
        &self,
        ctx: &mut TurnContext,
        posture: ToolPosture,
        transcript: &mut Vec<TranscriptEntry>,
        lead: &Lead,
    ) -> Result<Option<String>, LlmError> {
        for round in 0..MAX_REASONING_ROUNDS {
            let (tools, tool_choice) = match &posture {
                ToolPosture::None => (Vec::new(), ToolChoice::None),
                // Forced only steers the first round; follow-ups revert to
                // auto so the model can narrate the result.
                ToolPosture::Forced(name) if round == 0 => {
                    (tool_menu(ctx.has_quote), ToolChoice::Forced(name))
                }
                _ => (tool_menu(ctx.has_quote), ToolChoice::Auto),
            };

            let outcome = self
                .reasoning
                .chat(&ChatRequest {
                    system: self.system_prompt(lead, ctx.has_quote),
                    transcript: transcript.clone(),
                    tools,
                    tool_choice,
                })
                .await?;

            if !outcome.tool_calls.is_empty() {
                self.dispatch_round(
                    ctx,
                    transcript,
                    outcome.text.unwrap_or_default(),
                    outcome.tool_calls,
                )
                .await;
                continue;
            }

            if let Some(text) = outcome.text {
                // Models sometimes emit the tool call as JSON in the text
                // channel; honor it as long as the tool is still on the menu.
                if let Some(call) = extract_tool_call(&text, KNOWN_TOOLS) {
                    if call.name != GERAR_ORCAMENTO || !ctx.has_quote {
                        self.dispatch_round(ctx, transcript, String::new(), vec![call]).await;
                        continue;
                    }
                }
                return Ok(Some(sanitize_reply(&text)));
            }

            warn!(event_name = "agent.empty_round", round);
            return Ok(None);
        }

        warn!(event_name = "agent.rounds_exhausted", lead_id = %ctx.lead_id.0);
        Ok(Some(PROCESSING_PLACEHOLDER.to_string()))
    }

    /// Executes one round's tool calls concurrently and appends exactly one
    /// result envelope per request, in request order.
    async fn dispatch_round(
        &self,
        ctx: &mut TurnContext,
        transcript: &mut Vec<TranscriptEntry>,
        content: String,
        calls: Vec<ToolCallRequest>,
    ) {
        transcript.push(TranscriptEntry::AssistantToolCalls { content, calls: calls.clone() });

        let mut tasks = JoinSet::new();
        for call in &calls {
            let router = self.router.clone();
            let snapshot = ctx.clone();
            let call = call.clone();
            tasks.spawn(async move {
                let outcome = router.dispatch(&call.name, &call.arguments, &snapshot).await;
                (call.id, call.name, outcome)
            });
        }

        let mut results: HashMap<String, (String, ToolOutcome)> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((call_id, name, outcome)) => {
                    results.insert(call_id, (name, outcome));
                }
                Err(err) => error!(event_name = "agent.tool_task_failed", error = %err),
            }
        }

        for call in calls {
            let (name, outcome) = results.remove(&call.id).unwrap_or_else(|| {
                (call.name.clone(), ToolOutcome::error("Falha interna ao executar a ferramenta."))
            });

            if name == GERAR_ORCAMENTO && outcome.success {
                self.record_quote_note(ctx, &outcome).await;
                ctx.has_quote = true;
            }

            transcript.push(TranscriptEntry::ToolResult {
                call_id: call.id,
                payload: outcome.payload,
            });
        }
    }

    /// Durable marker so future turns know a quote already went out, even
    /// after the transcript window rolls past this conversation.
    async fn record_quote_note(&self, ctx: &TurnContext, outcome: &ToolOutcome) {
        let payload: serde_json::Value =
            serde_json::from_str(&outcome.payload).unwrap_or_default();
        let numero = payload["numero"].as_str().unwrap_or("?");
        let total = payload["valor_total"]
            .as_str()
            .and_then(|raw| raw.parse().ok())
            .map(format_brl)
            .unwrap_or_else(|| "?".to_string());
        let validade = payload["validade"].as_str().unwrap_or("?");
        let delivered = payload["pdf_url"].as_str().map(|url| !url.is_empty()).unwrap_or(false);

        let note = format!(
            "[ORÇAMENTO ENVIADO] Número: {numero} | Total: R$ {total} | Validade: {validade} | {}",
            if delivered { "PDF enviado ao cliente." } else { "PDF indisponível." },
        );

        if let Err(err) =
            self.messages.append(new_message(&ctx.lead_id, MessageRole::ToolNote, &note)).await
        {
            warn!(event_name = "agent.note_failed", error = %err);
        }
    }

    async fn load_or_create_lead(&self, turn: &InboundTurn) -> Result<Lead, RepositoryError> {
        if let Some(mut lead) = self.leads.find_by_phone(&turn.phone).await? {
            // The repository keeps the first stored name; this only fills a
            // hole, never renames.
            if lead.name.is_none() && turn.sender_name.is_some() {
                lead.name = turn.sender_name.clone();
                self.leads.save(lead.clone()).await?;
            }
            return Ok(lead);
        }

        let lead = Lead {
            id: LeadId(format!("lead-{}", Uuid::new_v4().simple())),
            phone: turn.phone.clone(),
            name: turn.sender_name.clone(),
            status: LeadStatus::New,
            awaiting_quote_confirmation: false,
            created_at: Utc::now(),
        };
        self.leads.save(lead.clone()).await?;
        info!(event_name = "lead.created", phone = %mask_phone(&turn.phone));
        Ok(lead)
    }

    /// Arms the forced-issuance flag when this reply offers a quote, and
    /// disarms it when the conversation moves on.
    async fn update_offer_flag(
        &self,
        lead_id: &LeadId,
        reply: &str,
        has_quote: bool,
    ) -> Result<(), RepositoryError> {
        let Some(mut lead) = self.leads.find_by_id(lead_id).await? else {
            return Ok(());
        };

        let offering = !has_quote && offers_quote(reply);
        if lead.awaiting_quote_confirmation != offering {
            lead.awaiting_quote_confirmation = offering;
            self.leads.save(lead).await?;
        }
        Ok(())
    }

    fn system_prompt(&self, lead: &Lead, has_quote: bool) -> String {
        let mut prompt = format!(
            "Você é {agent}, atendente comercial da {company} no WhatsApp.\n\n\
             Diretrizes:\n\
             - Responda curto, simpático e natural, como uma pessoa real digitando no celular.\n\
             - Preços vêm sempre da ferramenta consultar_precos. Nunca invente valores.\n\
             - Antes de gerar um orçamento, confirme com o cliente os itens e as quantidades.\n\
             - Use gerar_orcamento somente depois que o cliente confirmar.\n\
             - Quando o cliente quiser fechar negócio ou negociar, use notificar_gestor.\n\
             - Nunca responda em JSON nem mencione ferramentas; fale apenas em português natural.",
            agent = self.settings.agent_name,
            company = self.settings.company_name,
        );

        if let Some(name) = &lead.name {
            prompt.push_str(&format!("\n\nO cliente se chama {name}."));
        }
        if has_quote {
            prompt.push_str(
                "\n\nEste cliente já recebeu um orçamento nesta conversa. Não gere outro; \
                 tire dúvidas sobre o orçamento existente.",
            );
        }
        prompt
    }

    fn turn_lock(&self, phone: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries with no turn in flight (strong count 1: the map's own Arc)
        // are dropped here so the map does not grow with every new customer.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(phone.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn turn_lock_count(&self) -> usize {
        self.turn_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

fn new_message(lead_id: &LeadId, role: MessageRole, text: &str) -> Message {
    Message {
        id: MessageId(Uuid::new_v4().to_string()),
        lead_id: lead_id.clone(),
        role,
        text: text.to_string(),
        created_at: Utc::now(),
    }
}
