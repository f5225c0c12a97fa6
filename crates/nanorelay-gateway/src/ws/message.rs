use nanorelay_core::{config::MAX_PAYLOAD_BYTES, error::Result, ClientId, RelayError};
use nanorelay_hub::RelayHub;
use nanorelay_protocol::ClientAction;

/// Process one inbound WS text frame.
///
/// Malformed frames come back as a non-fatal error and are never answered;
/// oversized ones are fatal and close the connection.
pub fn handle(client_id: ClientId, text: &str, hub: &RelayHub) -> Result<()> {
    if text.len() > MAX_PAYLOAD_BYTES {
        return Err(RelayError::PayloadTooLarge {
            size: text.len(),
            max: MAX_PAYLOAD_BYTES,
        });
    }

    let action = ClientAction::parse(text)?;
    hub.apply(client_id, action);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanorelay_core::{config::RelaySettings, AccountId};
    use nanorelay_protocol::UpstreamRequest;
    use tokio::sync::mpsc;

    fn hub() -> (RelayHub, mpsc::UnboundedReceiver<UpstreamRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RelayHub::new(&RelaySettings::default(), tx), rx)
    }

    #[test]
    fn register_frame_reaches_the_hub() {
        let (hub, mut upstream) = hub();
        let (tx, _rx) = mpsc::channel(1);
        let client = hub.connect(tx);

        handle(client, r#"{"action":"register_account","account":"nano_1abc"}"#, &hub).unwrap();
        assert_eq!(hub.tracked_accounts(), vec![AccountId::from("nano_1abc")]);
        assert_eq!(
            upstream.try_recv().unwrap(),
            UpstreamRequest::add_account("confirmation", AccountId::from("nano_1abc"))
        );

        handle(client, r#"{"action":"unregister_account","account":"nano_1abc"}"#, &hub).unwrap();
        assert!(hub.tracked_accounts().is_empty());
    }

    #[test]
    fn garbage_is_dropped_without_touching_state() {
        let (hub, mut upstream) = hub();
        let client = ClientId::new();

        let err = handle(client, "hello?", &hub).unwrap_err();
        assert!(!err.is_fatal());
        assert!(handle(client, r#"{"action":"register_account"}"#, &hub).is_err());
        assert!(hub.tracked_accounts().is_empty());
        assert!(upstream.try_recv().is_err());
    }

    #[test]
    fn oversized_frame_is_fatal() {
        let (hub, _upstream) = hub();
        let text = format!(
            r#"{{"action":"register_account","account":"{}"}}"#,
            "x".repeat(MAX_PAYLOAD_BYTES)
        );
        let err = handle(ClientId::new(), &text, &hub).unwrap_err();
        assert!(err.is_fatal());
        assert!(hub.tracked_accounts().is_empty());
    }
}
