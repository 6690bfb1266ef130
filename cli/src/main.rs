mod file_storage;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::{Map, Value, json};
use strade::{CallOutcome, SessionError, SessionEvent, SessionStore};
use tracing_subscriber::EnvFilter;

use crate::file_storage::FileStorage;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not signed in; run `strade-cli login` first")]
    NotSignedIn,
    #[error("the server rejected the stored session; you have been signed out")]
    Unauthorized,
    #[error("the session changed while the request was in flight; response discarded")]
    Stale,
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("server returned HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "strade-cli", about = "$TRADE account and trading CLI")]
struct Cli {
    #[arg(long, env = "STRADE_API_URL", default_value = "http://localhost:8001")]
    base_url: String,

    #[arg(long, env = "STRADE_SESSION_FILE", default_value = ".strade_session")]
    session_file: String,

    #[command(subcommand)]
    command: Command,
}

struct CliContext {
    base_url: String,
    session: SessionStore,
    session_file: String,
    http: reqwest::Client,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange login name and password for a stored session.
    Login {
        login_name: String,
        #[arg(long, env = "STRADE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show whether a session is stored.
    Status,
    /// Show balances of all linked exchange accounts.
    Dashboard,
    /// Link an exchange account with its API keys.
    ConnectExchange(ConnectArgs),
    /// Place an order on a linked exchange.
    Order(OrderArgs),
    /// Start a subscription payment and print the approval URL.
    Subscribe {
        plan: Plan,
        #[arg(long, value_enum, default_value_t = Period::Yearly)]
        period: Period,
    },
}

#[derive(Args, Debug)]
struct ConnectArgs {
    exchange: String,
    #[arg(long)]
    holder: String,
    #[arg(long, env = "STRADE_EXCHANGE_KEY", hide_env_values = true)]
    key: String,
    #[arg(long, env = "STRADE_EXCHANGE_SECRET", hide_env_values = true)]
    secret: String,
    #[arg(long, env = "STRADE_EXCHANGE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

#[derive(Args, Debug)]
struct OrderArgs {
    exchange: String,
    /// Market symbol such as BTC/USDT.
    symbol: String,
    #[arg(value_enum)]
    side: Side,
    amount: f64,
    /// Reference price; also the limit price for limit orders.
    #[arg(long)]
    price: f64,
    #[arg(long = "type", value_enum, default_value_t = OrderType::Market)]
    order_type: OrderType,
    #[arg(long)]
    stop_price: Option<f64>,
    #[arg(long)]
    stop_loss: Option<f64>,
    #[arg(long, value_delimiter = ',')]
    take_profit: Vec<f64>,
    #[arg(long)]
    comment: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Buy,
    Sell,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OrderType {
    Market,
    Limit,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Plan {
    Basic,
    Silver,
    Gold,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Period {
    Yearly,
    Monthly,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let session = SessionStore::new(FileStorage::new(&cli.session_file));
    let _session_log = session.subscribe(|event| match event {
        SessionEvent::SignedIn(_) => tracing::info!("session stored"),
        SessionEvent::SignedOut => tracing::info!("session cleared"),
    });
    let ctx = CliContext {
        base_url: cli.base_url,
        session,
        session_file: cli.session_file,
        http: reqwest::Client::new(),
    };

    match cli.command {
        Command::Login { login_name, password } => run_login(&ctx, &login_name, &password).await,
        Command::Logout => run_logout(&ctx),
        Command::Status => run_status(&ctx),
        Command::Dashboard => {
            let value = authorized_request(&ctx, reqwest::Method::GET, "/dashboard/", None).await?;
            print_json(value.get("dashboard").unwrap_or(&Value::Null))
        }
        Command::ConnectExchange(args) => {
            let value =
                authorized_request(&ctx, reqwest::Method::POST, "/connect-exchange/", Some(connect_payload(&args)))
                    .await?;
            print_json(&value)
        }
        Command::Order(args) => {
            let value =
                authorized_request(&ctx, reqwest::Method::POST, "/trades/create-order/", Some(order_payload(&args)))
                    .await?;
            print_json(&value)
        }
        Command::Subscribe { plan, period } => {
            let value =
                authorized_request(&ctx, reqwest::Method::POST, "/payment", Some(payment_payload(plan, period)))
                    .await?;
            let url = value
                .get("approval_url")
                .and_then(Value::as_str)
                .ok_or(CliError::MissingField("approval_url"))?;
            println!("approve the payment at: {url}");
            Ok(())
        }
    }
}

async fn run_login(ctx: &CliContext, login_name: &str, password: &str) -> Result<(), CliError> {
    if ctx.session.is_authenticated()? {
        return Err(SessionError::AlreadyAuthenticated.into());
    }
    let response = ctx
        .http
        .post(endpoint(&ctx.base_url, "/login/"))
        .json(&json!({ "login_name": login_name, "password": password }))
        .send()
        .await?;
    let status = response.status().as_u16();
    let value = response.json::<Value>().await.unwrap_or(Value::Null);
    if !(200..300).contains(&status) {
        return Err(server_error(status, &value));
    }
    let token = value
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or(CliError::MissingField("access_token"))?;
    ctx.session.set_credential(token)?;
    println!("signed in as {login_name}");
    Ok(())
}

fn run_logout(ctx: &CliContext) -> Result<(), CliError> {
    ctx.session.clear_credential()?;
    println!("signed out");
    Ok(())
}

fn run_status(ctx: &CliContext) -> Result<(), CliError> {
    let authenticated = ctx.session.is_authenticated()?;
    print_json(&json!({ "authenticated": authenticated, "session_file": ctx.session_file }))
}

/// Send a request carrying the stored credential and report the outcome to
/// the session store. A 401/403 clears the stored session.
async fn authorized_request(
    ctx: &CliContext,
    method: reqwest::Method,
    path: &str,
    body: Option<Value>,
) -> Result<Value, CliError> {
    let ticket = ctx.session.begin_call()?.ok_or(CliError::NotSignedIn)?;
    let mut authorization = HeaderValue::from_str(&ticket.authorization())?;
    authorization.set_sensitive(true);

    let request = ctx.http.request(method, endpoint(&ctx.base_url, path)).header(AUTHORIZATION, authorization);
    let request = if let Some(json) = body { request.json(&json) } else { request };

    let response = request.send().await?;
    let status = response.status().as_u16();
    match ctx.session.finish_call(&ticket, status)? {
        CallOutcome::Stale => return Err(CliError::Stale),
        CallOutcome::Rejected => return Err(CliError::Unauthorized),
        CallOutcome::Accepted => {}
    }

    let value = response.json::<Value>().await.unwrap_or(Value::Null);
    if !ctx.session.is_current(&ticket) {
        return Err(CliError::Stale);
    }
    if !(200..300).contains(&status) {
        return Err(server_error(status, &value));
    }
    Ok(value)
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Prefer the backend's `{"detail": ...}` message.
fn server_error(status: u16, body: &Value) -> CliError {
    let message = match body.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(detail) => detail.to_string(),
        None => body.to_string(),
    };
    CliError::Server { status, message }
}

fn connect_payload(args: &ConnectArgs) -> Value {
    let mut payload = Map::new();
    payload.insert("account_holder".to_owned(), json!(args.holder));
    payload.insert("exchange_name".to_owned(), json!(args.exchange));
    payload.insert("key".to_owned(), json!(args.key));
    payload.insert("secret_key".to_owned(), json!(args.secret));
    if let Some(passphrase) = args.passphrase.as_deref().filter(|p| !p.is_empty()) {
        payload.insert("passphrase".to_owned(), json!(passphrase));
    }
    Value::Object(payload)
}

fn order_payload(args: &OrderArgs) -> Value {
    let mut payload = Map::new();
    payload.insert("trade_price".to_owned(), json!(args.price));
    payload.insert("symbol".to_owned(), json!(args.symbol.to_ascii_uppercase()));
    payload.insert(
        "side".to_owned(),
        json!(match args.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }),
    );
    payload.insert("amount".to_owned(), json!(args.amount));
    let order_type = match args.order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
    };
    payload.insert("order_type".to_owned(), json!(order_type));
    if args.order_type == OrderType::Limit {
        payload.insert("price".to_owned(), json!(args.price));
    }
    if let Some(stop_price) = args.stop_price {
        payload.insert("stop_price".to_owned(), json!(stop_price));
    }
    if let Some(stop_loss) = args.stop_loss {
        payload.insert("stop_loss_price".to_owned(), json!(stop_loss));
    }
    if !args.take_profit.is_empty() {
        payload.insert("take_profit_prices".to_owned(), json!(args.take_profit));
    }
    if let Some(comment) = &args.comment {
        payload.insert("comment".to_owned(), json!(comment));
    }
    payload.insert("exchangeName".to_owned(), json!(args.exchange));
    Value::Object(payload)
}

fn payment_payload(plan: Plan, period: Period) -> Value {
    let product_name = match plan {
        Plan::Basic => "Basic",
        Plan::Silver => "Silver",
        Plan::Gold => "Gold",
    };
    let product_days = match period {
        Period::Yearly => 365,
        Period::Monthly => 30,
    };
    json!({ "currency": "USD", "product_name": product_name, "product_days": product_days })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
