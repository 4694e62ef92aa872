use std::sync::{Arc, Mutex};

use dash_pipeline::{
    fetch_presentation, Advance, CacheDirectory, ConstantAdaptation, DashError, DashEvent,
    DashPlayer, HttpTransport, Mp4Remuxer, PlayerConfig, RateBasedAdaptation, SegmentCallback,
    SegmentFetcher, TransportError,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT10S" minBufferTime="PT4S">
  <Period>
    <AdaptationSet mimeType="video/mp4" segmentAlignment="true">
      <SegmentTemplate timescale="1000" duration="2000" startNumber="1"
                       initialization="$RepresentationID$/init.mp4"
                       media="$RepresentationID$/seg-$Number%03d$.m4s"/>
      <Representation id="low" bandwidth="200000" width="640" height="360" codecs="avc1.42c01e"/>
      <Representation id="high" bandwidth="2000000" width="1920" height="1080" codecs="avc1.640028"/>
    </AdaptationSet>
  </Period>
</MPD>"#;

const SEGMENTS: usize = 5;

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn media_body(representation: &str, number: usize) -> Vec<u8> {
    format!("{representation}:{number}").into_bytes()
}

async fn mount_stream(server: &MockServer, broken: Option<&str>) {
    Mock::given(method("GET"))
        .and(path("/vod/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
        .mount(server)
        .await;

    for representation in ["low", "high"] {
        Mock::given(method("GET"))
            .and(path(format!("/vod/{representation}/init.mp4")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"INIT".to_vec()))
            .mount(server)
            .await;

        for number in 1..=SEGMENTS {
            let file = format!("/vod/{representation}/seg-{number:03}.m4s");
            let response = if broken == Some(file.as_str()) {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200).set_body_bytes(media_body(representation, number))
            };
            Mock::given(method("GET"))
                .and(path(file))
                .respond_with(response)
                .mount(server)
                .await;
        }
    }
}

struct Session {
    player: DashPlayer,
    events: Arc<Mutex<Vec<DashEvent>>>,
    _directory: Arc<CacheDirectory>,
}

async fn open_session(
    server: &MockServer,
    logic: Arc<dyn dash_pipeline::AdaptationLogic>,
) -> Result<Session, DashError> {
    let transport = Arc::new(HttpTransport::new());
    let url = Url::parse(&format!("{}/vod/manifest.mpd", server.uri())).unwrap();
    let presentation = Arc::new(fetch_presentation(transport.as_ref(), &url).await?);
    let set = presentation.periods[0].video_set().unwrap().clone();

    let directory = Arc::new(CacheDirectory::temporary().unwrap());
    let fetcher = SegmentFetcher::new(transport, Arc::new(Mp4Remuxer), directory.clone());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: SegmentCallback = Arc::new(move |event: DashEvent| sink.lock().unwrap().push(event));

    let player = DashPlayer::open(
        presentation,
        set,
        logic,
        fetcher,
        &PlayerConfig::default().with_min_buffer_floor_us(0),
        Some(callback),
    )
    .await?;

    Ok(Session {
        player,
        events,
        _directory: directory,
    })
}

async fn media_requests(server: &MockServer, file: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == file)
        .count()
}

#[tokio::test]
async fn plays_to_end_of_stream() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_stream(&server, None).await;

    let mut session = open_session(&server, Arc::new(ConstantAdaptation::lowest()))
        .await
        .unwrap();
    let player = &mut session.player;

    let mut played = vec![];
    loop {
        let segment = player.current_segment().unwrap().clone();
        let mut expected = b"INIT".to_vec();
        expected.extend(media_body("low", segment.number + 1));
        assert_eq!(std::fs::read(segment.path()).unwrap(), expected);
        assert_eq!(segment.pts_offset_us, segment.number as i64 * 2_000_000);
        played.push(segment.number);

        match player.advance_to_next_segment().await.unwrap() {
            Advance::Segment(next) => assert_eq!(next.number, segment.number + 1),
            Advance::EndOfStream => break,
        }
    }
    assert_eq!(played, (0..SEGMENTS).collect::<Vec<_>>());

    for number in 1..=SEGMENTS {
        assert_eq!(media_requests(&server, &format!("/vod/low/seg-{number:03}.m4s")).await, 1);
        assert_eq!(media_requests(&server, &format!("/vod/high/seg-{number:03}.m4s")).await, 0);
    }
    assert_eq!(media_requests(&server, "/vod/low/init.mp4").await, 1);

    let events = session.events.lock().unwrap().clone();
    assert_eq!(events.last(), Some(&DashEvent::EndOfStream));
    assert!(!events
        .iter()
        .any(|event| matches!(event, DashEvent::RepresentationChanged { .. })));
}

#[tokio::test]
async fn seek_returns_segment_start() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_stream(&server, None).await;

    let mut session = open_session(&server, Arc::new(ConstantAdaptation::highest()))
        .await
        .unwrap();
    let player = &mut session.player;
    assert_eq!(player.active_representation().id, "high");

    let outcome = player.seek(7_300_000).await.unwrap();
    assert!(outcome.moved);
    assert_eq!(outcome.index, 3);
    assert_eq!(outcome.pts_offset_us, 6_000_000);

    let Advance::Segment(last) = player.advance_to_next_segment().await.unwrap() else {
        panic!("expected the last segment");
    };
    assert_eq!(last.number, 4);
    assert!(matches!(
        player.advance_to_next_segment().await.unwrap(),
        Advance::EndOfStream
    ));
}

#[tokio::test]
async fn rate_based_playback_completes() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_stream(&server, None).await;

    let logic = Arc::new(RateBasedAdaptation::new());
    let mut session = open_session(&server, logic.clone()).await.unwrap();
    // no throughput samples yet
    assert_eq!(session.player.active_representation().id, "low");

    let mut advanced = 0;
    while let Advance::Segment(_) = session.player.advance_to_next_segment().await.unwrap() {
        advanced += 1;
    }
    assert_eq!(advanced, SEGMENTS - 1);
    assert!(logic.average_bandwidth() > 0.0);
}

#[tokio::test]
async fn server_error_surfaces_on_advance() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_stream(&server, Some("/vod/low/seg-002.m4s")).await;

    let mut session = open_session(&server, Arc::new(ConstantAdaptation::lowest()))
        .await
        .unwrap();

    let err = session.player.advance_to_next_segment().await.unwrap_err();
    assert!(matches!(err, DashError::Transport(TransportError::Status { .. })));
    assert_eq!(session.player.current_index(), 0);

    let events = session.events.lock().unwrap().clone();
    assert!(events.iter().any(|event| matches!(
        event,
        DashEvent::DownloadError { url, .. } if url.ends_with("/vod/low/seg-002.m4s")
    )));
}

#[tokio::test]
async fn missing_manifest_is_a_transport_error() {
    let server = MockServer::start().await;
    let url = Url::parse(&format!("{}/vod/none.mpd", server.uri())).unwrap();
    let err = fetch_presentation(&HttpTransport::new(), &url).await.unwrap_err();
    assert!(matches!(err, DashError::Transport(TransportError::Status { .. })));
}
