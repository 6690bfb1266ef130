use super::*;

fn order_args() -> OrderArgs {
    OrderArgs {
        exchange: "kraken".to_owned(),
        symbol: "btc/usdt".to_owned(),
        side: Side::Buy,
        amount: 0.25,
        price: 60000.0,
        order_type: OrderType::Market,
        stop_price: None,
        stop_loss: None,
        take_profit: Vec::new(),
        comment: None,
    }
}

// =============================================================
// Argument parsing
// =============================================================

#[test]
fn cli_parses_order_with_take_profit_list() {
    let cli = Cli::try_parse_from([
        "strade-cli",
        "--session-file",
        "/tmp/s",
        "order",
        "binance",
        "ETH/USDT",
        "sell",
        "2",
        "--price",
        "3000",
        "--type",
        "limit",
        "--take-profit",
        "2900,2800",
    ])
    .unwrap();
    assert_eq!(cli.session_file, "/tmp/s");
    let Command::Order(args) = cli.command else {
        panic!("expected order command");
    };
    assert_eq!(args.side, Side::Sell);
    assert_eq!(args.order_type, OrderType::Limit);
    assert_eq!(args.take_profit, vec![2900.0, 2800.0]);
}

#[test]
fn cli_subscribe_defaults_to_yearly() {
    let cli = Cli::try_parse_from(["strade-cli", "subscribe", "gold"]).unwrap();
    assert!(matches!(cli.command, Command::Subscribe { plan: Plan::Gold, period: Period::Yearly }));
}

// =============================================================
// Payloads
// =============================================================

#[test]
fn order_payload_market_order_omits_optional_fields() {
    let payload = order_payload(&order_args());
    assert_eq!(payload["symbol"], "BTC/USDT");
    assert_eq!(payload["side"], "buy");
    assert_eq!(payload["order_type"], "market");
    assert_eq!(payload["exchangeName"], "kraken");
    assert!(payload.get("price").is_none());
    assert!(payload.get("take_profit_prices").is_none());
}

#[test]
fn order_payload_limit_order_carries_price_and_targets() {
    let args = OrderArgs {
        order_type: OrderType::Limit,
        stop_loss: Some(58000.0),
        take_profit: vec![61000.0],
        ..order_args()
    };
    let payload = order_payload(&args);
    assert_eq!(payload["price"], 60000.0);
    assert_eq!(payload["stop_loss_price"], 58000.0);
    assert_eq!(payload["take_profit_prices"], json!([61000.0]));
}

#[test]
fn connect_payload_skips_empty_passphrase() {
    let args = ConnectArgs {
        exchange: "OKX".to_owned(),
        holder: "John".to_owned(),
        key: "k".to_owned(),
        secret: "s".to_owned(),
        passphrase: Some(String::new()),
    };
    let payload = connect_payload(&args);
    assert_eq!(payload["exchange_name"], "OKX");
    assert_eq!(payload["secret_key"], "s");
    assert!(payload.get("passphrase").is_none());
}

#[test]
fn payment_payload_maps_plan_and_period() {
    assert_eq!(
        payment_payload(Plan::Silver, Period::Monthly),
        json!({ "currency": "USD", "product_name": "Silver", "product_days": 30 })
    );
    assert_eq!(payment_payload(Plan::Basic, Period::Yearly)["product_days"], 365);
}

// =============================================================
// Responses
// =============================================================

#[test]
fn server_error_prefers_detail() {
    let error = server_error(400, &json!({ "detail": "Username already exists" }));
    assert_eq!(error.to_string(), "server returned HTTP 400: Username already exists");
    let error = server_error(500, &Value::Null);
    assert_eq!(error.to_string(), "server returned HTTP 500: null");
}

#[test]
fn endpoint_joins_without_double_slash() {
    assert_eq!(endpoint("http://localhost:8001/", "/login/"), "http://localhost:8001/login/");
}

// =============================================================
// Session handling
// =============================================================

#[test]
fn logout_without_session_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session");
    let ctx = CliContext {
        base_url: "http://localhost:8001".to_owned(),
        session: SessionStore::new(FileStorage::new(&path)),
        session_file: path.display().to_string(),
        http: reqwest::Client::new(),
    };
    run_logout(&ctx).unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn authorized_request_requires_session() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CliContext {
        base_url: "http://127.0.0.1:9".to_owned(),
        session: SessionStore::new(FileStorage::new(dir.path().join("session"))),
        session_file: String::new(),
        http: reqwest::Client::new(),
    };
    let result = authorized_request(&ctx, reqwest::Method::GET, "/dashboard/", None).await;
    assert!(matches!(result, Err(CliError::NotSignedIn)));
}
