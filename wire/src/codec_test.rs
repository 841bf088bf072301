use super::*;

use crate::event::{
    InputText, Interrupt, InterruptType, OutputAudioContent, OutputContentAddition,
    OutputFunctionCall, OutputFunctionCallContent, OutputStage, OutputText, OutputTextContent,
    OutputTranscription, OutputVideoContent, Segment, ServerReady, Transcription,
};

fn sample_events() -> Vec<(Event, Role)> {
    let stage_id = Uuid::new_v4();
    let content_id = Uuid::new_v4();
    let mut metadata = Map::new();
    metadata.insert("caption".to_owned(), Value::String("figure 1".to_owned()));

    vec![
        (Event::Config(Config { chat_id: Some(Uuid::new_v4()), ..Config::default() }), Role::Client),
        (Event::InputText(InputText { data: "hi".to_owned() }), Role::Client),
        (
            Event::InputMedia(InputMedia { id: Uuid::new_v4(), data: vec![1, 2, 3] }),
            Role::Client,
        ),
        (Event::InputEnd, Role::Client),
        (Event::Interrupt(Interrupt { interrupt_type: InterruptType::User }), Role::Client),
        (
            Event::ServerReady(ServerReady { chat_id: Uuid::new_v4(), request_id: Uuid::new_v4() }),
            Role::Server,
        ),
        (
            Event::OutputTranscription(OutputTranscription {
                transcription: Transcription {
                    segments: vec![Segment { text: "hello".to_owned(), start: 0.0, end: 0.8 }],
                },
            }),
            Role::Server,
        ),
        (
            Event::OutputStage(OutputStage {
                id: stage_id,
                parent_id: None,
                title: "root".to_owned(),
                description: String::new(),
            }),
            Role::Server,
        ),
        (Event::OutputTextContent(OutputTextContent { id: content_id, stage_id }), Role::Server),
        (
            Event::OutputFunctionCallContent(OutputFunctionCallContent {
                id: Uuid::new_v4(),
                stage_id,
            }),
            Role::Server,
        ),
        (
            Event::OutputAudioContent(OutputAudioContent {
                id: Uuid::new_v4(),
                stage_id,
                nchannels: 1,
                sample_rate: 16_000,
                sample_width: 2,
            }),
            Role::Server,
        ),
        (
            Event::OutputVideoContent(OutputVideoContent {
                id: Uuid::new_v4(),
                stage_id,
                fps: 30,
                width: 640,
                height: 480,
            }),
            Role::Server,
        ),
        (
            Event::OutputContentAddition(OutputContentAddition { content_id, metadata }),
            Role::Server,
        ),
        (Event::OutputText(OutputText { content_id, data: "chunk".to_owned() }), Role::Server),
        (
            Event::OutputMedia(OutputMedia { content_id, data: vec![0xaa, 0xbb] }),
            Role::Server,
        ),
        (
            Event::OutputFunctionCall(OutputFunctionCall {
                content_id,
                data: r#"{"name":"lookup","args":{}}"#.to_owned(),
            }),
            Role::Server,
        ),
        (Event::OutputEnd, Role::Server),
        (Event::SessionEnd, Role::Client),
    ]
}

#[test]
fn every_event_round_trips_through_its_frame() {
    for (event, from) in sample_events() {
        let frame = encode(&event).expect("encode");
        let decoded = decode(frame, from).expect("decode");
        assert_eq!(decoded, event, "round trip failed for {:?}", event.event_type());
    }
}

#[test]
fn text_frames_carry_integer_event_type() {
    for (event, _) in sample_events() {
        let FramePayload::Text(text) = encode(&event).expect("encode") else {
            continue;
        };
        let value: Value = serde_json::from_str(&text).expect("frame is json");
        assert_eq!(
            value.get("event_type").and_then(Value::as_i64),
            Some(i64::from(event.event_type().as_i32()))
        );
    }
}

#[test]
fn media_events_encode_as_prefixed_binary_frames() {
    let content_id = Uuid::new_v4();
    let event = Event::OutputMedia(OutputMedia { content_id, data: vec![9, 8, 7] });

    let FramePayload::Binary(bytes) = encode(&event).expect("encode") else {
        panic!("media must encode to a binary frame");
    };
    assert_eq!(&bytes[..MEDIA_PREFIX_LEN], content_id.as_bytes());
    assert_eq!(&bytes[MEDIA_PREFIX_LEN..], &[9, 8, 7]);
}

#[test]
fn binary_frame_of_exactly_prefix_length_decodes_to_empty_chunk() {
    let id = Uuid::new_v4();
    let event = decode(FramePayload::Binary(id.as_bytes().to_vec()), Role::Client)
        .expect("decode");
    assert_eq!(event, Event::InputMedia(InputMedia { id, data: Vec::new() }));
}

#[test]
fn binary_frame_shorter_than_prefix_is_malformed() {
    let err = decode(FramePayload::Binary(vec![0; 15]), Role::Server)
        .expect_err("frame should be malformed");
    assert!(matches!(err, CodecError::ShortBinaryFrame { len: 15 }));
}

#[test]
fn binary_frame_direction_selects_media_event() {
    let id = Uuid::new_v4();
    let mut bytes = id.as_bytes().to_vec();
    bytes.extend_from_slice(b"pcm");

    let inbound = decode(FramePayload::Binary(bytes.clone()), Role::Client).expect("decode");
    assert!(matches!(inbound, Event::InputMedia(_)));

    let outbound = decode(FramePayload::Binary(bytes), Role::Server).expect("decode");
    assert!(matches!(outbound, Event::OutputMedia(_)));
}

#[test]
fn decode_rejects_unknown_event_type() {
    let err = decode(FramePayload::Text(r#"{"event_type":99}"#.to_owned()), Role::Client)
        .expect_err("event type should be unknown");
    assert!(matches!(err, CodecError::UnknownEventType(99)));
}

#[test]
fn decode_rejects_missing_event_type() {
    let err = decode(FramePayload::Text(r#"{"data":"hi"}"#.to_owned()), Role::Client)
        .expect_err("event_type should be required");
    assert!(matches!(err, CodecError::MissingEventType));
}

#[test]
fn decode_rejects_invalid_json() {
    let err = decode(FramePayload::Text("not json".to_owned()), Role::Client)
        .expect_err("frame should be malformed");
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn decode_rejects_missing_required_field() {
    // OutputText without `content_id`.
    let err = decode(FramePayload::Text(r#"{"event_type":13,"data":"x"}"#.to_owned()), Role::Server)
        .expect_err("content_id should be required");
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn decode_rejects_invalid_uuid_string() {
    let err = decode(
        FramePayload::Text(r#"{"event_type":13,"content_id":"not-a-uuid","data":"x"}"#.to_owned()),
        Role::Server,
    )
    .expect_err("uuid should be invalid");
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn decode_ignores_unknown_fields() {
    let event = decode(
        FramePayload::Text(r#"{"event_type":1,"data":"hi","hint":"future field"}"#.to_owned()),
        Role::Client,
    )
    .expect("decode");
    assert_eq!(event, Event::InputText(InputText { data: "hi".to_owned() }));
}

#[test]
fn decode_rejects_media_event_in_text_frame() {
    let err = decode(FramePayload::Text(r#"{"event_type":14}"#.to_owned()), Role::Server)
        .expect_err("media must be binary");
    assert!(matches!(err, CodecError::MediaAsText(EventType::OutputMedia)));
}

#[test]
fn decode_rejects_config_with_invalid_silence_duration() {
    let err = decode(
        FramePayload::Text(r#"{"event_type":0,"silence_duration":-2.0}"#.to_owned()),
        Role::Client,
    )
    .expect_err("silence_duration should be invalid");
    assert!(matches!(err, CodecError::InvalidSilenceDuration(_)));
}

#[test]
fn encode_rejects_config_with_invalid_silence_duration() {
    let config = Config { silence_duration: -2.0, ..Config::default() };
    let err = encode(&Event::Config(config)).expect_err("silence_duration should be invalid");
    assert!(matches!(err, CodecError::InvalidSilenceDuration(_)));
}

#[test]
fn content_declarations_carry_matching_type_field() {
    let event = Event::OutputTextContent(OutputTextContent {
        id: Uuid::new_v4(),
        stage_id: Uuid::new_v4(),
    });
    let FramePayload::Text(text) = encode(&event).expect("encode") else {
        panic!("content declarations are text frames");
    };
    let value: Value = serde_json::from_str(&text).expect("frame is json");
    assert_eq!(value.get("type").and_then(Value::as_i64), Some(2));
}

#[test]
fn decode_rejects_contradictory_content_type() {
    let id = Uuid::new_v4();
    let stage_id = Uuid::new_v4();
    // event_type says text content, `type` says audio.
    let text = format!(r#"{{"event_type":8,"type":0,"id":"{id}","stage_id":"{stage_id}"}}"#);
    let err = decode(FramePayload::Text(text), Role::Server).expect_err("type should mismatch");
    assert!(matches!(
        err,
        CodecError::ContentTypeMismatch { event: EventType::OutputTextContent, found: Some(0) }
    ));
}

#[test]
fn decode_rejects_missing_content_type() {
    let id = Uuid::new_v4();
    let stage_id = Uuid::new_v4();
    let text = format!(r#"{{"event_type":8,"id":"{id}","stage_id":"{stage_id}"}}"#);
    let err = decode(FramePayload::Text(text), Role::Server).expect_err("type should be required");
    assert!(matches!(err, CodecError::ContentTypeMismatch { found: None, .. }));
}

#[test]
fn stage_parent_id_null_and_absent_both_decode_to_root() {
    let id = Uuid::new_v4();
    for text in [
        format!(r#"{{"event_type":7,"id":"{id}","parent_id":null,"title":"t","description":""}}"#),
        format!(r#"{{"event_type":7,"id":"{id}","title":"t","description":""}}"#),
    ] {
        let event = decode(FramePayload::Text(text), Role::Server).expect("decode");
        let Event::OutputStage(stage) = event else {
            panic!("expected stage event");
        };
        assert_eq!(stage.parent_id, None);
    }
}
