//! 真实适配器对上游 HTTP 失败的处理：本地 TCP 桩服务返回固定状态码

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use wayfarer::cache::{QueryCache, TtlPolicy};
    use wayfarer::core::{ManualClock, ProviderError};
    use wayfarer::providers::mock::{
        sample_flight_quote, sample_search_results, StaticFlightProvider, StaticSearchProvider,
    };
    use wayfarer::providers::{
        AmadeusClient, AmadeusFlights, FallbackOrchestrator, FlightCriteria, FlightProvider, SearchProvider,
        SearchQuery, TavilySearch, TokenCache,
    };

    const TOKEN_PATH: &str = "/v1/security/oauth2/token";
    const OFFERS_PATH: &str = "/v2/shopping/flight-offers";

    /// (路径, 状态码, 响应体)
    type Route = (&'static str, u16, &'static str);

    /// 按路径返回固定响应的 HTTP/1.1 服务；返回 base_url 与收到的请求路径
    async fn stub_upstream(routes: Vec<Route>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let path = read_request_path(&mut socket).await;
                    let (status, body) = routes
                        .iter()
                        .find(|(p, _, _)| *p == path)
                        .map(|(_, s, b)| (*s, *b))
                        .unwrap_or((404, "{}"));
                    log.lock().unwrap().push(path);

                    let reason = match status {
                        200 => "OK",
                        401 => "Unauthorized",
                        500 => "Internal Server Error",
                        _ => "Not Found",
                    };
                    let resp = format!(
                        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        reason,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(resp.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}", addr), seen)
    }

    /// 读完请求头和 content-length 指定的请求体，返回去掉查询串的路径
    async fn read_request_path(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let body_len = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }

        let head = String::from_utf8_lossy(&buf);
        let target = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/");
        target.split('?').next().unwrap_or(target).to_string()
    }

    async fn setup() -> (TempDir, Arc<ManualClock>, QueryCache) {
        let dir = TempDir::new().unwrap();
        let pool = wayfarer::db::connect(dir.path().join("http.db")).await.unwrap();
        let clock = Arc::new(ManualClock::at_epoch(1_780_000_000));
        let cache = QueryCache::with_clock(pool, clock.clone(), TtlPolicy::default());
        (dir, clock, cache)
    }

    fn amadeus(base_url: &str, clock: Arc<ManualClock>) -> Arc<AmadeusClient> {
        let tokens = Arc::new(TokenCache::with_clock(clock));
        Arc::new(AmadeusClient::new(base_url, "client-id", "client-secret", 5, tokens))
    }

    fn assert_http_500(err: &ProviderError, provider: &str) {
        match err {
            ProviderError::Unavailable { provider: p, reason } => {
                assert_eq!(p, provider);
                assert!(reason.starts_with("HTTP 500"), "unexpected reason: {}", reason);
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tavily_server_error_falls_back_without_caching() {
        let (_dir, _clock, cache) = setup().await;
        let (base_url, seen) = stub_upstream(vec![("/search", 500, r#"{"detail":"upstream exploded"}"#)]).await;

        let tavily = Arc::new(TavilySearch::new(base_url, "tvly-key", 5, cache.clone()));
        let secondary = Arc::new(StaticSearchProvider::returning(
            "serpapi_search",
            sample_search_results("best time to visit Lisbon", Some("Spring and autumn")),
        ));
        let orchestrator = FallbackOrchestrator::default()
            .with_search_provider(tavily.clone())
            .with_search_provider(secondary.clone());

        let query = SearchQuery::new("best time to visit Lisbon");
        let result = orchestrator.search(&query).await.unwrap();
        assert_eq!(result.provider, "serpapi_search");
        assert!(!result.cached);
        assert_eq!(result.data.answer.as_deref(), Some("Spring and autumn"));
        assert_eq!(secondary.calls(), 1);
        assert_eq!(cache.len().await.unwrap(), 0);

        let err = tavily.search(&query).await.unwrap_err();
        assert_http_500(&err, "tavily");
        assert_eq!(cache.len().await.unwrap(), 0);
        assert_eq!(seen.lock().unwrap().as_slice(), ["/search", "/search"]);
    }

    #[tokio::test]
    async fn test_amadeus_unauthorized_drops_token() {
        let (_dir, clock, cache) = setup().await;
        let (base_url, seen) = stub_upstream(vec![
            (TOKEN_PATH, 200, r#"{"access_token":"tok-1","expires_in":1799}"#),
            (OFFERS_PATH, 401, r#"{"errors":[{"status":401,"title":"Invalid access token"}]}"#),
        ])
        .await;

        let client = amadeus(&base_url, clock);
        let flights = Arc::new(AmadeusFlights::new(client.clone(), cache.clone()));
        let orchestrator = FallbackOrchestrator::default()
            .with_flight_provider(flights.clone())
            .with_flight_provider(Arc::new(StaticFlightProvider::returning(
                "serpapi_flights",
                sample_flight_quote("JFK", "LHR", "2026-06"),
            )));

        let criteria = FlightCriteria::new("JFK", "LHR", "2026-06");
        let result = orchestrator.search_flights(&criteria).await.unwrap();
        assert_eq!(result.provider, "serpapi_flights");
        assert!(!result.cached);
        assert_eq!(cache.len().await.unwrap(), 0);

        assert!(client.tokens().current().is_none());
        assert_eq!(client.tokens().refresh_count(), 1);

        // 被拒的令牌不再复用，下一次调用重新换取
        let err = flights.search_flights(&criteria).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert_eq!(client.tokens().refresh_count(), 2);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [TOKEN_PATH, OFFERS_PATH, TOKEN_PATH, OFFERS_PATH]
        );
    }

    #[tokio::test]
    async fn test_amadeus_token_endpoint_failure() {
        let (_dir, clock, cache) = setup().await;
        let (base_url, seen) = stub_upstream(vec![(TOKEN_PATH, 500, r#"{"error":"server_error"}"#)]).await;

        let client = amadeus(&base_url, clock);
        let flights = AmadeusFlights::new(client.clone(), cache.clone());

        let err = flights
            .search_flights(&FlightCriteria::new("JFK", "LHR", "2026-06"))
            .await
            .unwrap_err();
        assert_http_500(&err, "amadeus_flights");
        assert!(client.tokens().current().is_none());
        assert_eq!(client.tokens().refresh_count(), 0);
        assert_eq!(cache.len().await.unwrap(), 0);
        // 没有令牌就不会请求报价接口
        assert_eq!(seen.lock().unwrap().as_slice(), [TOKEN_PATH]);
    }
}
