//! Structured-content handling for the text channel.
//!
//! Models sometimes serialize a tool invocation as JSON inside their text
//! reply instead of using the structured channel, and sometimes wrap final
//! text in code fences. Both are recovered here, bounded and without regexes.

use uuid::Uuid;

use crate::llm::ToolCallRequest;

/// Substituted when sanitizing leaves nothing to say.
pub const NEUTRAL_ACK: &str = "Certo! Estou por aqui se precisar de mais alguma coisa. 😊";

/// Scans text for a JSON object invoking one of the known tools.
///
/// Accepts `{"tool_name"|"name"|"tool": ..., "parameters"|"arguments"|"args":
/// {...}}`. The candidate slice runs from the first `{` to the last `}`; if
/// that fails to parse, exactly one repair is attempted by appending a
/// closing brace (truncated output is the common corruption). Anything else
/// degrades silently to `None` and the text is treated as final.
pub fn extract_tool_call(text: &str, known_tools: &[&str]) -> Option<ToolCallRequest> {
    let start = text.find('{')?;
    let end = text.rfind('}').map(|index| index + 1).unwrap_or(text.len());
    if end <= start {
        return None;
    }
    let candidate = &text[start..end];

    let parsed = serde_json::from_str::<serde_json::Value>(candidate)
        .or_else(|_| serde_json::from_str::<serde_json::Value>(&format!("{candidate}}}")))
        .ok()?;

    let object = parsed.as_object()?;
    let name = object
        .get("tool_name")
        .or_else(|| object.get("name"))
        .or_else(|| object.get("tool"))?
        .as_str()?;

    if !known_tools.contains(&name) {
        return None;
    }

    let arguments = object
        .get("parameters")
        .or_else(|| object.get("arguments"))
        .or_else(|| object.get("args"))
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    Some(ToolCallRequest {
        id: format!("recovered-{}", Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments: arguments.to_string(),
    })
}

/// Strips code fences and bare JSON objects from a final reply.
///
/// Fenced blocks are removed wholesale (their content is machine output, not
/// conversation). If what remains is itself one top-level JSON object, the
/// reply is considered empty and the neutral acknowledgement is substituted.
pub fn sanitize_reply(text: &str) -> String {
    let without_fences = strip_code_fences(text);
    let trimmed = without_fences.trim();

    if trimmed.is_empty() || is_bare_json_object(trimmed) {
        return NEUTRAL_ACK.to_string();
    }

    trimmed.to_string()
}

fn strip_code_fences(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut inside_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            inside_fence = !inside_fence;
            continue;
        }
        if !inside_fence {
            output.push_str(line);
            output.push('\n');
        }
    }

    output
}

fn is_bare_json_object(text: &str) -> bool {
    text.starts_with('{')
        && text.ends_with('}')
        && serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(text).is_ok()
}

#[cfg(test)]
mod tests {
    use crate::tools::{CONSULTAR_PRECOS, GERAR_ORCAMENTO, NOTIFICAR_GESTOR};

    use super::{extract_tool_call, sanitize_reply, NEUTRAL_ACK};

    const KNOWN: &[&str] = &[CONSULTAR_PRECOS, GERAR_ORCAMENTO, NOTIFICAR_GESTOR];

    #[test]
    fn embedded_tool_json_is_recovered() {
        let text = r#"{"tool_name": "consultar_precos", "parameters": {"busca": "telha"}}"#;
        let call = extract_tool_call(text, KNOWN).expect("recovered call");

        assert_eq!(call.name, "consultar_precos");
        assert!(call.id.starts_with("recovered-"));
        let args: serde_json::Value = serde_json::from_str(&call.arguments).expect("args");
        assert_eq!(args["busca"], "telha");
    }

    #[test]
    fn surrounding_prose_does_not_defeat_recovery() {
        let text = "Vou consultar: {\"name\": \"consultar_precos\", \"arguments\": {\"busca\": \"calha\"}} um momento";
        let call = extract_tool_call(text, KNOWN).expect("recovered call");
        assert_eq!(call.name, "consultar_precos");
    }

    #[test]
    fn a_single_truncated_brace_is_repaired() {
        let text = r#"{"tool_name": "consultar_precos", "parameters": {"busca": "telha"}"#;
        assert!(extract_tool_call(text, KNOWN).is_some());
    }

    #[test]
    fn unknown_tools_and_plain_prose_degrade_silently() {
        assert!(extract_tool_call("tudo certo, posso ajudar?", KNOWN).is_none());
        assert!(extract_tool_call(
            r#"{"tool_name": "apagar_tudo", "parameters": {}}"#,
            KNOWN,
        )
        .is_none());
        assert!(extract_tool_call(r#"{"busca": "telha"}"#, KNOWN).is_none());
    }

    #[test]
    fn code_fences_are_stripped_from_final_replies() {
        let text = "Aqui está o resumo:\n```json\n{\"total\": 100}\n```\nQualquer dúvida me chama!";
        assert_eq!(sanitize_reply(text), "Aqui está o resumo:\nQualquer dúvida me chama!");
    }

    #[test]
    fn bare_json_replies_become_the_neutral_ack() {
        assert_eq!(sanitize_reply(r#"{"status": "ok"}"#), NEUTRAL_ACK);
        assert_eq!(sanitize_reply("```\n{\"a\":1}\n```"), NEUTRAL_ACK);
        assert_eq!(sanitize_reply("   "), NEUTRAL_ACK);
    }

    #[test]
    fn ordinary_text_passes_through_trimmed() {
        assert_eq!(sanitize_reply("  Oi! Tudo bem?  "), "Oi! Tudo bem?");
    }
}
