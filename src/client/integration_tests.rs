#[cfg(test)]
mod integration_tests {
    use super::super::*;
    use crate::{HttpError, MockTransport, ResponseFormat};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASE_URL: &str = "http://api.test/api/0.6";

    fn capabilities_xml(version: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <api>
    <version minimum="{version}" maximum="{version}"/>
    <area maximum="0.25"/>
    <timeout seconds="300"/>
  </api>
</osm>"#
        )
    }

    const MAP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
 <bounds minlat="-22.010" minlon="-47.889" maxlat="-22.001" maxlon="-47.880"/>
 <node id="1" lat="-22.010" lon="-47.889"/>
 <node id="2" lat="-22.001" lon="-47.880"/>
 <way id="10"><nd ref="1"/><nd ref="2"/><tag k="name" v="Avenida"/></way>
</osm>"#;

    fn bbox() -> Bounds {
        Bounds::new(-47.889, -47.880, -22.010, -22.001)
    }

    fn client(transport: &MockTransport) -> MapClient {
        let config = ApiConfig {
            base_url: BASE_URL.to_string(),
            ..ApiConfig::default()
        };
        MapClient::new(Arc::new(transport.clone()), config)
    }

    #[tokio::test]
    async fn test_login_then_fetch() {
        let transport = MockTransport::osm_api(capabilities_xml("0.6"), MAP_XML);
        let mut client = client(&transport);
        assert_eq!(client.session_state(), SessionState::LoggedOut);

        let caps = client.login().await.unwrap();
        assert_eq!(caps.version_minimum, "0.6");
        assert!(client.is_ready());

        let model = client.get_map(&bbox()).await.unwrap();
        assert_eq!(model.node_count(), 2);
        assert_eq!(model.ways()[0].name(), Some("Avenida"));

        let urls: Vec<String> = transport.requests().into_iter().map(|(_, url)| url).collect();
        assert_eq!(
            urls,
            vec![
                format!("{}/capabilities", BASE_URL),
                format!("{}/map?bbox=-47.889,-22.01,-47.88,-22.001", BASE_URL),
            ]
        );
    }

    #[tokio::test]
    async fn test_version_mismatch_is_fatal() {
        let transport = MockTransport::osm_api(capabilities_xml("0.5"), MAP_XML);
        let mut client = client(&transport);

        let result = client.login().await;
        match result {
            Err(OsmCanvasError::UnsupportedVersion { expected, found }) => {
                assert_eq!(expected, "0.6");
                assert_eq!(found, "0.5");
            }
            other => panic!("expected UnsupportedVersion, got {:?}", other.map(|_| ())),
        }
        assert_eq!(client.session_state(), SessionState::Failed);
        assert!(client.capabilities().is_none());

        let fetch = client.get_map(&bbox()).await;
        assert!(matches!(fetch, Err(OsmCanvasError::NotReady)));
        assert_eq!(transport.request_count("/map"), 0);
    }

    #[tokio::test]
    async fn test_version_is_compared_numerically() {
        let transport = MockTransport::osm_api(capabilities_xml("0.60"), MAP_XML);
        let mut client = client(&transport);

        let caps = client.login().await.unwrap();
        assert_eq!(caps.version_minimum, "0.60");
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn test_get_map_before_login() {
        let transport = MockTransport::osm_api(capabilities_xml("0.6"), MAP_XML);
        let client = client(&transport);

        for bounds in [bbox(), Bounds::new(1.0, 0.0, 1.0, 0.0)] {
            let result = client.get_map(&bounds).await;
            assert!(matches!(result, Err(OsmCanvasError::NotReady)));
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_login_transport_failure_can_be_retried() {
        let failing = MockTransport::new().with_response("/capabilities", 500, "boom");
        let mut client = client(&failing);

        let result = client.login().await;
        assert!(matches!(
            result,
            Err(OsmCanvasError::Transport(HttpError::HttpStatus { status: 500 }))
        ));
        assert_eq!(client.session_state(), SessionState::Failed);

        client.transport = Arc::new(MockTransport::osm_api(capabilities_xml("0.6"), MAP_XML));
        client.login().await.unwrap();
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn test_map_server_error() {
        let transport = MockTransport::new()
            .with_response("/capabilities", 200, capabilities_xml("0.6"))
            .with_response("/map", 500, "internal error");
        let mut client = client(&transport);
        client.login().await.unwrap();

        let result = client.get_map(&bbox()).await;
        assert!(matches!(
            result,
            Err(OsmCanvasError::Transport(HttpError::HttpStatus { status: 500 }))
        ));
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn test_map_network_failure() {
        let transport = MockTransport::new()
            .with_response("/capabilities", 200, capabilities_xml("0.6"))
            .with_failure("/map", HttpError::Timeout { seconds: 60 });
        let mut client = client(&transport);
        client.login().await.unwrap();

        let result = client.get_map(&bbox()).await;
        assert!(matches!(
            result,
            Err(OsmCanvasError::Transport(HttpError::Timeout { seconds: 60 }))
        ));
    }

    #[tokio::test]
    async fn test_malformed_map_body() {
        let transport = MockTransport::osm_api(capabilities_xml("0.6"), "<osm><bounds");
        let mut client = client(&transport);
        client.login().await.unwrap();

        let result = client.get_map(&bbox()).await;
        assert!(matches!(result, Err(OsmCanvasError::Parse(_))));
    }

    #[tokio::test]
    async fn test_invalid_request_bounds() {
        let transport = MockTransport::osm_api(capabilities_xml("0.6"), MAP_XML);
        let mut client = client(&transport);
        client.login().await.unwrap();

        let inverted = Bounds::new(-47.880, -47.889, -22.010, -22.001);
        let result = client.get_map(&inverted).await;
        assert!(matches!(result, Err(OsmCanvasError::Config(_))));

        let not_finite = Bounds::new(-47.889, f64::NAN, -22.010, -22.001);
        let result = client.get_map(&not_finite).await;
        assert!(matches!(result, Err(OsmCanvasError::Config(_))));

        let too_large = Bounds::new(-48.0, -47.0, -23.0, -22.0);
        let result = client.get_map(&too_large).await;
        assert!(matches!(result, Err(OsmCanvasError::Config(_))));

        assert_eq!(transport.request_count("/map"), 0);
    }

    #[tokio::test]
    async fn test_ready_fires_once() {
        let transport = MockTransport::osm_api(capabilities_xml("0.6"), MAP_XML);
        let mut client = client(&transport);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        client.on_ready(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.login().await.unwrap();
        client.login().await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let late = Arc::new(Mutex::new(None));
        let sink = late.clone();
        client.on_ready(move |caps| {
            *sink.lock().unwrap() = Some(caps.version_minimum.clone());
        });
        assert_eq!(late.lock().unwrap().as_deref(), Some("0.6"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_json_endpoints() {
        let capabilities = r#"{"version":"0.6","api":{"version":{"minimum":"0.6","maximum":"0.6"},"area":{"maximum":0.25}}}"#;
        let map = r#"{"version":"0.6","bounds":{"minlat":-22.01,"minlon":-47.889,"maxlat":-22.001,"maxlon":-47.88},
            "elements":[
                {"type":"node","id":1,"lat":-22.01,"lon":-47.889},
                {"type":"node","id":2,"lat":-22.001,"lon":-47.88},
                {"type":"way","id":10,"nodes":[1,2],"tags":{"name":"Avenida"}}
            ]}"#;
        let transport = MockTransport::osm_api(capabilities, map);
        let config = ApiConfig {
            base_url: BASE_URL.to_string(),
            format: ResponseFormat::Json,
            ..ApiConfig::default()
        };
        let mut client = MapClient::new(Arc::new(transport.clone()), config);

        client.login().await.unwrap();
        let model = client.get_map(&bbox()).await.unwrap();
        assert_eq!(model.way_count(), 1);
        assert_eq!(model.ways()[0].node_refs, vec!["1", "2"]);
        assert_eq!(transport.request_count("/map.json?bbox="), 1);
        assert_eq!(transport.request_count("/capabilities.json"), 1);
    }
}
