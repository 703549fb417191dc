//! Turn classification: decides the tool posture before any model call.
//!
//! Pure string heuristics, deliberately kept out of the loop's control flow
//! so they can be tuned (or replaced) without touching state-machine logic.

use crate::tools::GERAR_ORCAMENTO;

/// Tool availability for one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolPosture {
    /// Pure greeting: no tools offered, the model answers from transcript.
    None,
    /// The customer just accepted a standing quote offer; the named tool is
    /// dispatched on the first reasoning round.
    Forced(&'static str),
    /// Model picks freely from the (possibly reduced) menu.
    Auto,
}

/// Greetings and closers that never need a tool. Confirmations ("sim", "ok")
/// are deliberately absent: they may be accepting a quote offer.
const GREETING_TOKENS: &[&str] = &[
    "oi",
    "olá",
    "ola",
    "bom dia",
    "boa tarde",
    "boa noite",
    "obrigado",
    "obrigada",
    "valeu",
    "até mais",
    "tchau",
    "até logo",
    "flw",
    "👍",
    "❤️",
    "😊",
    "🙏",
];

/// Words that signal the customer wants something done. Any of these in the
/// inbound text vetoes the greeting shortcut.
const ACTION_TOKENS: &[&str] = &[
    "preço",
    "preco",
    "valor",
    "telha",
    "calha",
    "metalon",
    "orçamento",
    "orcamento",
    "quanto",
    "comprar",
    "produto",
    "gerar",
    "montar",
    "fazer",
    "enviar",
    "manda",
    "quero",
    "pode",
    "sim",
    "confirma",
    "confirmar",
    "fecha",
    "fechar",
    "pedido",
    "compra",
    "pagar",
    "entrega",
];

/// Short-message acceptances of a standing offer.
const AFFIRMATION_TOKENS: &[&str] = &[
    "sim",
    "pode",
    "ok",
    "claro",
    "quero",
    "isso",
    "bora",
    "fechado",
    "confirmo",
    "manda",
    "vamos",
    "beleza",
];

/// Assistant phrasings that put a quote on the table. Verb stems so that
/// "monto", "monte" and "montar" all count.
const OFFER_VERB_STEMS: &[&str] = &["mont", "prepar", "ger", "faç", "fazer", "envi", "mand"];

pub fn classify_turn(
    inbound: &str,
    has_quote: bool,
    awaiting_quote_confirmation: bool,
) -> ToolPosture {
    if is_pure_greeting(inbound) {
        return ToolPosture::None;
    }

    if !has_quote && awaiting_quote_confirmation && is_affirmation(inbound) {
        return ToolPosture::Forced(GERAR_ORCAMENTO);
    }

    ToolPosture::Auto
}

/// True only for greetings/closers with zero action intent. The intent veto
/// runs first: "oi, quanto custa?" opens with a greeting but is a question.
pub fn is_pure_greeting(text: &str) -> bool {
    let cleaned = text.trim().to_lowercase();
    if cleaned.is_empty() {
        return false;
    }

    if ACTION_TOKENS.iter().any(|token| cleaned.contains(token)) {
        return false;
    }

    let exact_greeting = GREETING_TOKENS.iter().any(|token| {
        cleaned == *token
            || cleaned.starts_with(&format!("{token}!"))
            || cleaned.starts_with(&format!("{token},"))
    });

    exact_greeting || cleaned.split_whitespace().count() <= 3
}

/// True for a short message accepting a standing offer ("pode", "sim, por
/// favor"). Long messages are left for the model to interpret.
pub fn is_affirmation(text: &str) -> bool {
    let cleaned = text.trim().to_lowercase();
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .map(|word| word.trim_matches(|ch: char| ch.is_ascii_punctuation()))
        .collect();

    words.len() <= 4 && words.iter().any(|word| AFFIRMATION_TOKENS.contains(word))
}

/// Whether an assistant reply puts a quote on the table: it names the quote,
/// uses an offering verb, and asks. Used once, when the reply is persisted,
/// to set the lead's awaiting-confirmation flag.
pub fn offers_quote(reply: &str) -> bool {
    let lowered = reply.to_lowercase();
    let mentions_quote = lowered.contains("orçamento") || lowered.contains("orcamento");
    let offering_verb = OFFER_VERB_STEMS.iter().any(|stem| lowered.contains(stem));

    mentions_quote && offering_verb && lowered.contains('?')
}

#[cfg(test)]
mod tests {
    use crate::tools::GERAR_ORCAMENTO;

    use super::{classify_turn, is_affirmation, is_pure_greeting, offers_quote, ToolPosture};

    #[test]
    fn greetings_never_get_tools() {
        for text in ["oi", "Olá!", "bom dia, tudo bem?", "valeu", "👍"] {
            assert_eq!(classify_turn(text, false, false), ToolPosture::None, "text: {text}");
        }
    }

    #[test]
    fn action_intent_vetoes_the_greeting_shortcut() {
        assert!(!is_pure_greeting("oi, quanto custa a telha?"));
        assert!(!is_pure_greeting("olá! quero um orçamento"));
        assert!(!is_pure_greeting("quero orçamento"));
        assert!(!is_pure_greeting("pode sim"));
        assert_eq!(classify_turn("quanto custa?", false, false), ToolPosture::Auto);
        // A greeting prefix must not shortcut past a price question.
        assert_eq!(classify_turn("oi, quanto custa a telha?", false, false), ToolPosture::Auto);
    }

    #[test]
    fn short_messages_without_intent_count_as_simple() {
        assert!(is_pure_greeting("tudo bem?"));
        assert!(!is_pure_greeting("preciso de 50 metros de calha para minha obra nova"));
    }

    #[test]
    fn affirmation_after_offer_forces_issuance() {
        assert_eq!(
            classify_turn("pode", false, true),
            ToolPosture::Forced(GERAR_ORCAMENTO),
        );
        assert_eq!(
            classify_turn("sim, por favor!", false, true),
            ToolPosture::Forced(GERAR_ORCAMENTO),
        );
    }

    #[test]
    fn forced_issuance_requires_the_standing_offer_and_no_quote() {
        // No offer pending: "pode" is just another message.
        assert_eq!(classify_turn("pode", false, false), ToolPosture::Auto);
        // Quote already exists: never force a second one.
        assert_eq!(classify_turn("pode", true, true), ToolPosture::Auto);
    }

    #[test]
    fn long_replies_are_not_treated_as_affirmations() {
        assert!(is_affirmation("pode"));
        assert!(is_affirmation("Sim, pode mandar"));
        assert!(!is_affirmation("pode me explicar melhor como funciona a entrega?"));
    }

    #[test]
    fn quote_offer_detection_matches_offering_questions() {
        assert!(offers_quote("Quer que eu monte um orçamento com a telha sanduíche?"));
        assert!(offers_quote("Posso gerar um orçamento pra você?"));
        assert!(!offers_quote("Seu orçamento foi enviado!"));
        assert!(!offers_quote("Temos telhas a partir de R$ 44,13. Quer saber mais?"));
    }
}
