use serde::Deserialize;

/// Placeholder the gateway substitutes for messages carrying no text. Inbound
/// turns equal to this are dropped before reaching the agent.
const MEDIA_PLACEHOLDER: &str = "[Mídia recebida]";

/// Events that carry a customer message. Everything else the instance emits
/// (connection updates, acks, presence) is acknowledged and ignored.
pub fn is_message_event(event: &str) -> bool {
    matches!(event, "messages.upsert" | "message" | "messages.set")
}

/// Evolution API v2 webhook envelope. The upstream schema drifts between
/// versions, so every field tolerates absence.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Option<EventData>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub key: Option<MessageKey>,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default, rename = "pushName")]
    pub push_name: Option<String>,
    #[serde(default, rename = "notifyName")]
    pub notify_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessageKey {
    #[serde(default, rename = "remoteJid")]
    pub remote_jid: Option<String>,
    #[serde(default, rename = "fromMe")]
    pub from_me: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default, rename = "extendedTextMessage")]
    pub extended_text: Option<ExtendedText>,
    #[serde(default, rename = "imageMessage")]
    pub image: Option<ImageMessage>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ImageMessage {
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub phone: String,
    pub text: String,
    pub sender_name: Option<String>,
}

/// Pulls a processable customer turn out of a webhook payload.
///
/// Returns `None` for our own outbound echoes (`fromMe`), group chats, and
/// media without any text to act on.
pub fn extract_inbound(payload: &WebhookPayload) -> Option<InboundMessage> {
    let data = payload.data.as_ref()?;
    let key = data.key.as_ref()?;

    if key.from_me {
        return None;
    }

    let remote_jid = key.remote_jid.as_deref()?;
    if remote_jid.contains("@g.us") {
        return None;
    }

    let phone = remote_jid.replace("@s.whatsapp.net", "").replace('+', "");
    if phone.is_empty() {
        return None;
    }

    let text = data
        .message
        .as_ref()
        .and_then(|message| {
            message
                .conversation
                .clone()
                .or_else(|| message.extended_text.as_ref().and_then(|ext| ext.text.clone()))
                .or_else(|| message.image.as_ref().and_then(|image| image.caption.clone()))
        })
        .unwrap_or_else(|| MEDIA_PLACEHOLDER.to_string());

    if text.trim().is_empty() || text.trim() == MEDIA_PLACEHOLDER {
        return None;
    }

    let sender_name = data.push_name.clone().or_else(|| data.notify_name.clone());

    Some(InboundMessage { phone, text, sender_name })
}

#[cfg(test)]
mod tests {
    use super::{extract_inbound, is_message_event, WebhookPayload};

    fn payload(value: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(value).expect("payload decodes")
    }

    #[test]
    fn plain_conversation_message_is_extracted() {
        let payload = payload(serde_json::json!({
            "event": "messages.upsert",
            "instance": "vendas",
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false },
                "pushName": "Marcos",
                "message": { "conversation": "quanto custa a telha sanduíche?" }
            }
        }));

        let inbound = extract_inbound(&payload).expect("inbound present");
        assert_eq!(inbound.phone, "5511999990000");
        assert_eq!(inbound.text, "quanto custa a telha sanduíche?");
        assert_eq!(inbound.sender_name.as_deref(), Some("Marcos"));
    }

    #[test]
    fn extended_text_and_image_caption_are_fallbacks() {
        let extended = payload(serde_json::json!({
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net" },
                "message": { "extendedTextMessage": { "text": "bom dia" } }
            }
        }));
        assert_eq!(extract_inbound(&extended).expect("inbound").text, "bom dia");

        let caption = payload(serde_json::json!({
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net" },
                "message": { "imageMessage": { "caption": "tem essa telha?" } }
            }
        }));
        assert_eq!(extract_inbound(&caption).expect("inbound").text, "tem essa telha?");
    }

    #[test]
    fn own_echoes_groups_and_bare_media_are_dropped() {
        let echo = payload(serde_json::json!({
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net", "fromMe": true },
                "message": { "conversation": "resposta nossa" }
            }
        }));
        assert_eq!(extract_inbound(&echo), None);

        let group = payload(serde_json::json!({
            "data": {
                "key": { "remoteJid": "123456789@g.us", "fromMe": false },
                "message": { "conversation": "mensagem de grupo" }
            }
        }));
        assert_eq!(extract_inbound(&group), None);

        let media_only = payload(serde_json::json!({
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false },
                "message": { "imageMessage": {} }
            }
        }));
        assert_eq!(extract_inbound(&media_only), None);
    }

    #[test]
    fn plus_prefix_is_stripped_from_the_phone() {
        let payload = payload(serde_json::json!({
            "data": {
                "key": { "remoteJid": "+5511999990000@s.whatsapp.net" },
                "message": { "conversation": "oi" }
            }
        }));
        assert_eq!(extract_inbound(&payload).expect("inbound").phone, "5511999990000");
    }

    #[test]
    fn only_message_events_are_processable() {
        assert!(is_message_event("messages.upsert"));
        assert!(is_message_event("message"));
        assert!(is_message_event("messages.set"));
        assert!(!is_message_event("connection.update"));
        assert!(!is_message_event(""));
    }
}
