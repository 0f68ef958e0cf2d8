use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use greenhouse_telemetry::export::ExportFormat;
use greenhouse_telemetry::{routes, Config, TelemetryService};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tempfile::TempDir;

// ---

const DOC: &str = r#"<estufa id="E01">
    <sensores>
        <sensor id="S01" tipo="temperatura"><unidade>°C</unidade></sensor>
        <sensor id="S02" tipo="pH"><unidade>pH</unidade></sensor>
    </sensores>
    <leituras>
        <leitura id="L01">
            <dataHora>2025-11-10T14:30:00</dataHora>
            <sensorRef ref="S01"/>
            <valor>22.5</valor>
        </leitura>
        <leitura id="L02">
            <dataHora>2025-11-10T14:31:00</dataHora>
            <sensorRef ref="S02"/>
            <valor>3.0</valor>
        </leitura>
    </leituras>
</estufa>"#;

#[derive(Debug, Deserialize)]
struct Alert {
    reading_id: String,
    sensor_id: String,
    #[serde(rename = "type")]
    sensor_type: String,
    value: f64,
    range: String,
}

struct TestApp {
    base: String,
    client: Client,
    _dir: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn spawn_app() -> Result<TestApp> {
    // ---
    let dir = TempDir::new()?;
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let cfg = Config {
        data_dir: dir.path().to_path_buf(),
        schema_path: root.join("schema/greenhouse.schema.json"),
        default_rules_path: root.join("config/default_rules.json"),
        listen_addr: [127, 0, 0, 1].into(),
        listen_port: 0,
        export_format: ExportFormat::default(),
    };
    let service = TelemetryService::from_config(&cfg)?;

    let listener = tokio::net::TcpListener::bind(cfg.socket_addr()).await?;
    let addr = listener.local_addr()?;
    let app = routes::router(Arc::new(service));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestApp {
        base: format!("http://{addr}"),
        client: Client::new(),
        _dir: dir,
    })
}

#[tokio::test]
async fn submit_then_duplicate_conflicts() -> Result<()> {
    // ---
    let app = spawn_app().await?;

    let resp = app.client.post(app.url("/api/leituras")).body(DOC).send().await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await?;
    assert_eq!(body["id"], "L01");
    assert_eq!(body["greenhouse_id"], "E01");

    let resp = app.client.post(app.url("/api/leituras")).body(DOC).send().await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], 409);
    assert_eq!(body["error"]["kind"], "conflict");
    Ok(())
}

#[tokio::test]
async fn schema_failures_are_bad_requests() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    let cases = [
        ("", "malformed"),
        ("<estufa id=\"E01\"><sensores>", "malformed"),
        (
            "<estufa id=\"E01\"><leituras><leitura id=\"L01\"><dataHora>2025-11-10T14:30:00</dataHora></leitura></leituras></estufa>",
            "schema_violation",
        ),
    ];
    for (body, kind) in cases {
        let resp = app.client.post(app.url("/api/leituras")).body(body).send().await?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        let json: Value = resp.json().await?;
        assert_eq!(json["error"]["kind"], kind, "{body}");
        assert_eq!(json["error"]["name"], "Bad Request");
    }

    let records: Vec<Value> = app.client.get(app.url("/api/leituras")).send().await?.json().await?;
    assert!(records.is_empty());
    Ok(())
}

#[tokio::test]
async fn alerts_reflect_configuration_changes() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    let resp = app.client.post(app.url("/api/leituras")).body(DOC).send().await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Default template has pH 5.5 - 6.5.
    let alerts: Vec<Alert> = app.client.get(app.url("/api/alertas")).send().await?.json().await?;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].range, "5.5 - 6.5");

    let resp = app
        .client
        .put(app.url("/api/configuracoes"))
        .body(r#"{"pH": {"min": 4.0, "max": 6.0}}"#)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let alerts: Vec<Alert> = app.client.get(app.url("/api/alertas")).send().await?.json().await?;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].reading_id, "L02");
    assert_eq!(alerts[0].sensor_id, "S02");
    assert_eq!(alerts[0].sensor_type, "pH");
    assert_eq!(alerts[0].value, 3.0);
    assert_eq!(alerts[0].range, "4.0 - 6.0");

    let resp = app.client.put(app.url("/api/configuracoes")).body("[]").send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.client.post(app.url("/api/configuracoes/reset")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let rules: Value = app.client.get(app.url("/api/configuracoes")).send().await?.json().await?;
    assert_eq!(rules["pH"]["min"], 5.5);
    assert_eq!(rules["pH"]["max"], 6.5);
    Ok(())
}

#[tokio::test]
async fn export_and_delete() -> Result<()> {
    // ---
    let app = spawn_app().await?;

    let resp = app.client.get(app.url("/api/exportar")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await?, "");

    app.client.post(app.url("/api/leituras")).body(DOC).send().await?;

    let resp = app.client.get(app.url("/api/exportar")).send().await?;
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/csv")));
    let text = resp.text().await?;
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "E01;L01;2025-11-10T14:30:00;S01;temperatura;22.5");

    let body: Value = app.client.delete(app.url("/api/leituras")).send().await?.json().await?;
    assert_eq!(body["deleted"], 1);

    let records: Vec<Value> = app.client.get(app.url("/api/leituras")).send().await?.json().await?;
    assert!(records.is_empty());
    Ok(())
}

#[tokio::test]
async fn health_reports_schema() -> Result<()> {
    // ---
    let app = spawn_app().await?;
    let body: Value = app.client.get(app.url("/health")).send().await?.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["schema"], "loaded");
    Ok(())
}
