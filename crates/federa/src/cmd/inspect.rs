use bytes::Bytes;
use federa_transport::{Message, PacketCoder, Payload};

use crate::cmd::InspectArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{parse_hex, print_json, print_table, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;
    let payload = PacketCoder::default()
        .decode(Bytes::from(bytes))
        .map_err(|err| transport_error("inspect failed", err))?;

    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&payload, false)?,
        OutputFormat::Pretty => {
            println!("packet={:?}", payload.packet_type());
            for row in rows(&payload) {
                println!("  {}", row.join(" "));
            }
        }
        OutputFormat::Table => print_table(&["TYPE", "FEDERATION", "DETAIL"], rows(&payload)),
    }
    Ok(SUCCESS)
}

fn rows(payload: &Payload) -> Vec<Vec<String>> {
    match payload {
        Payload::Messages(messages) => messages.iter().map(message_row).collect(),
        Payload::FederationAdded { federation, process_id }
        | Payload::FederationRemoved { federation, process_id } => vec![vec![
            format!("{:?}", payload.packet_type()),
            federation.clone(),
            format!("process={process_id}"),
        ]],
        Payload::Handshake { process_id, process_type } => vec![vec![
            format!("{:?}", payload.packet_type()),
            String::new(),
            format!("process={process_id} type={process_type}"),
        ]],
        Payload::Authenticate(credentials) => vec![vec![
            format!("{:?}", payload.packet_type()),
            String::new(),
            format!("subject={} nickname={}", credentials.subject_id, credentials.nickname),
        ]],
        Payload::Heartbeat => vec![vec![format!("{:?}", payload.packet_type()), String::new(), String::new()]],
    }
}

fn message_row(message: &Message) -> Vec<String> {
    let detail = match message {
        Message::Null => String::new(),
        Message::ObjectChanges(changes) => {
            let names: Vec<&str> = changes.properties.keys().map(String::as_str).collect();
            format!(
                "{:?} {} {} [{}]",
                changes.change,
                changes.class_name,
                changes.object,
                names.join(", ")
            )
        }
        Message::EventDispatch { event, .. } => format!("event={event}"),
        Message::ServiceRequest {
            service, request_id, ..
        } => format!("service={service} request={request_id}"),
        Message::ServiceFulfill { request_id, .. } => format!("request={request_id}"),
        Message::ServiceReject { request_id, .. } => format!("request={request_id}"),
    };
    vec![
        format!("{:?}", message.message_type()),
        message.federation().unwrap_or_default().to_string(),
        detail,
    ]
}

#[cfg(test)]
mod tests {
    use federa_codec::ObjectId;
    use federa_transport::{ObjectChange, ObjectChanges};

    use super::*;

    #[test]
    fn object_change_rows_list_properties() {
        let message = Message::ObjectChanges(
            ObjectChanges::new("world", ObjectId::ZERO, "Unit", ObjectChange::Update)
                .with_property("hp", 3)
                .with_property("name", "ada"),
        );
        let row = message_row(&message);
        assert_eq!(row[1], "world");
        assert!(row[2].ends_with("[hp, name]"), "{}", row[2]);
    }

    #[test]
    fn heartbeat_has_one_row() {
        assert_eq!(rows(&Payload::Heartbeat).len(), 1);
    }
}
