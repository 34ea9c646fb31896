//! Personalization token rendering — `{field}` substitution from recipient
//! custom fields, applied per recipient just before the adapter call.

use sendfleet_core::types::{ChannelPayload, Recipient};

/// Replace `{field}` tokens with recipient values. `{display_name}` and
/// `{address}` are always available; everything else comes from
/// `custom_fields`. Unknown tokens are left intact so template typos are
/// visible in previews instead of silently vanishing.
pub fn render_template(template: &str, recipient: &Recipient) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let Some(start) = rest.find('{') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail[1..].find('}') else {
            out.push_str(tail);
            break;
        };
        let field = &tail[1..1 + end];
        let value = match field {
            "display_name" => Some(recipient.display_name.as_str()),
            "address" => Some(recipient.address.as_str()),
            _ => recipient.custom_fields.get(field).map(String::as_str),
        };
        match value {
            Some(v) => out.push_str(v),
            None => {
                out.push('{');
                out.push_str(field);
                out.push('}');
            }
        }
        rest = &tail[end + 2..];
    }

    out
}

/// Render every text field of a payload for one recipient.
pub fn render_payload(payload: &ChannelPayload, recipient: &Recipient) -> ChannelPayload {
    match payload {
        ChannelPayload::Email {
            subject,
            body,
            from_name,
        } => ChannelPayload::Email {
            subject: render_template(subject, recipient),
            body: render_template(body, recipient),
            from_name: from_name.clone(),
        },
        ChannelPayload::Sms {
            message,
            template_id,
        } => ChannelPayload::Sms {
            message: render_template(message, recipient),
            template_id: template_id.clone(),
        },
        ChannelPayload::Whatsapp {
            message,
            template_id,
            template_params,
        } => ChannelPayload::Whatsapp {
            message: render_template(message, recipient),
            template_id: template_id.clone(),
            template_params: template_params
                .iter()
                .map(|p| render_template(p, recipient))
                .collect(),
        },
    }
}
