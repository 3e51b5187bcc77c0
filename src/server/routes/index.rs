use axum::response::Html;

/// `GET /` — a minimal human-readable dashboard; the proxy keeps no event history to render, so
/// this is deliberately static rather than a query surface over workspace/edge state.
pub async fn index() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>edge-relay</title></head>
<body>
  <h1>edge-relay</h1>
  <p>Proxy between an upstream issue tracker and connected edge workers.</p>
  <ul>
    <li><code>GET /oauth/authorize</code> — begin authorization</li>
    <li><code>GET /events/stream</code> — attach an NDJSON stream</li>
    <li><code>POST /webhook</code> — upstream webhook ingress</li>
  </ul>
</body>
</html>"#,
    )
}
