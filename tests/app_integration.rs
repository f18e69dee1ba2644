use pnlfolio::AppCommand;
use pnlfolio::config::AppConfig;
use pnlfolio::core::transaction::{
    AssetClass, Operation, PriceInput, TransactionInput, parse_timestamp,
};
use std::fs;
use std::path::Path;
use tracing::info;

mod test_utils {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_binance_mock_server(mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub async fn create_alpha_vantage_mock_server(symbol: &str, price: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "GLOBAL_QUOTE"))
            .and(query_param("symbol", symbol))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"Global Quote":{{"01. symbol":"{symbol}","05. price":"{price}"}}}}"#
            )))
            .mount(&mock_server)
            .await;

        mock_server
    }
}

fn write_config(dir: &Path, binance_url: &str, alpha_vantage_url: &str) -> String {
    let config_path = dir.join("config.yaml");
    let config_content = format!(
        r#"
        display_currency: "USD"
        data_path: "{}"
        providers:
          binance:
            base_url: "{binance_url}"
          alpha_vantage:
            base_url: "{alpha_vantage_url}"
            api_key: "demo"
            request_delay_ms: 0
    "#,
        dir.join("data").display()
    );
    fs::write(&config_path, config_content).expect("Failed to write config file");
    config_path.to_str().unwrap().to_string()
}

fn input(symbol: &str, class: AssetClass, op: Operation, quantity: f64, price: f64) -> TransactionInput {
    TransactionInput {
        symbol: symbol.to_string(),
        asset_class: class,
        operation: op,
        quantity,
        price: PriceInput::UnitPrice(price),
        fee: None,
        timestamp: parse_timestamp("2024-01-15").unwrap(),
    }
}

async fn run(command: AppCommand, config_path: &str, owner: Option<&str>) {
    let result = pnlfolio::run_command(command, Some(config_path), owner).await;
    assert!(result.is_ok(), "Command failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let binance = test_utils::create_binance_mock_server(
        r#"[{"symbol":"BTCUSDT","price":"20000.00"}]"#,
    )
    .await;
    let alpha_vantage = test_utils::create_alpha_vantage_mock_server("AAPL", "190.00").await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &binance.uri(), &alpha_vantage.uri());

    run(
        AppCommand::Add(input("btc", AssetClass::Crypto, Operation::Buy, 2.0, 10000.0)),
        &config_path,
        None,
    )
    .await;
    run(
        AppCommand::Add(input("BTC", AssetClass::Crypto, Operation::Sell, 1.0, 15000.0)),
        &config_path,
        None,
    )
    .await;
    run(
        AppCommand::Add(input("AAPL", AssetClass::Stock, Operation::Buy, 10.0, 150.0)),
        &config_path,
        None,
    )
    .await;

    run(AppCommand::Summary, &config_path, None).await;
    run(AppCommand::List, &config_path, None).await;

    let config = AppConfig::load_from_path(&config_path).unwrap();
    let ledger = pnlfolio::store::open_ledger(&config, None).unwrap();
    let txs = ledger.load().await.unwrap();
    info!(count = txs.len(), "Loaded local ledger");
    assert_eq!(txs.len(), 3);
    assert!(txs.iter().all(|t| t.id.starts_with("local_")));
}

#[test_log::test(tokio::test)]
async fn test_summary_survives_unreachable_providers() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "http://127.0.0.1:1", "http://127.0.0.1:1");

    run(
        AppCommand::Add(input("ETH", AssetClass::Crypto, Operation::Buy, 1.0, 2000.0)),
        &config_path,
        None,
    )
    .await;
    run(AppCommand::Summary, &config_path, None).await;
}

#[test_log::test(tokio::test)]
async fn test_edit_remove_and_sync() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "http://127.0.0.1:1", "http://127.0.0.1:1");
    let config = AppConfig::load_from_path(&config_path).unwrap();

    run(
        AppCommand::Add(input("SOL", AssetClass::Crypto, Operation::Buy, 5.0, 20.0)),
        &config_path,
        None,
    )
    .await;
    run(
        AppCommand::Add(input("EURUSD", AssetClass::Forex, Operation::Buy, 1000.0, 1.1)),
        &config_path,
        None,
    )
    .await;

    let local = pnlfolio::store::open_ledger(&config, None)
        .unwrap()
        .load()
        .await
        .unwrap();
    let sol = local.iter().find(|t| t.symbol == "SOL").unwrap().id.clone();
    let eur = local.iter().find(|t| t.symbol == "EURUSD").unwrap().id.clone();

    run(
        AppCommand::Edit {
            id: sol.clone(),
            input: input("SOL", AssetClass::Crypto, Operation::Buy, 6.0, 20.0),
        },
        &config_path,
        None,
    )
    .await;
    run(AppCommand::Remove { id: eur }, &config_path, None).await;
    run(AppCommand::Sync, &config_path, Some("alice")).await;

    let owned = pnlfolio::store::open_ledger(&config, Some("alice".to_string()))
        .unwrap()
        .load()
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].symbol, "SOL");
    assert_eq!(owned[0].quantity, 6.0);

    // A second sync has nothing left to move.
    run(AppCommand::Sync, &config_path, Some("alice")).await;
    let owned = pnlfolio::store::open_ledger(&config, Some("alice".to_string()))
        .unwrap()
        .load()
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_invalid_transaction_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "http://127.0.0.1:1", "http://127.0.0.1:1");

    let result = pnlfolio::run_command(
        AppCommand::Add(input("BTC", AssetClass::Crypto, Operation::Buy, -1.0, 100.0)),
        Some(&config_path),
        None,
    )
    .await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("quantity"));
}
