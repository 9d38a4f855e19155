use dotenv::dotenv;
use serde_json::json;
use std::process::ExitCode;
use structopt::StructOpt;
use tracing::{error, info};

use admission_gate::{
    init_logging, AdmissionRequest, ClientMeta, Gate, KeyClass, StartupConfig,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "admission_gate",
    about = "Runs one request through the admission pipeline against live stores"
)]
struct Opt {
    /// API key to present
    #[structopt(short, long)]
    key: String,

    /// Key class; detected from the key prefix when omitted
    #[structopt(long, possible_values = &["public", "secret"])]
    class: Option<String>,

    /// Client address as seen by the proxy
    #[structopt(long, default_value = "127.0.0.1")]
    addr: String,

    /// Client user agent
    #[structopt(long, default_value = "admission_gate-cli")]
    user_agent: String,

    /// Emit logs as JSON lines
    #[structopt(long)]
    json_logs: bool,
}

fn key_class(opt: &Opt) -> Option<KeyClass> {
    match opt.class.as_deref() {
        Some("public") => Some(KeyClass::Public),
        Some("secret") => Some(KeyClass::Secret),
        _ => KeyClass::detect(&opt.key),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let opt = Opt::from_args();

    if opt.json_logs {
        admission_gate::logging::init_json();
    } else {
        init_logging();
    }

    let config = match StartupConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // Unrecognised prefixes still go through the pipeline so the attempt is counted
    let class = key_class(&opt).unwrap_or(KeyClass::Secret);
    let request = AdmissionRequest::new(
        class,
        opt.key.as_str(),
        ClientMeta::new(opt.addr, opt.user_agent),
    );

    let gate = match Gate::connect(config).await {
        Ok(gate) => gate,
        Err(e) => {
            error!(error = %e, "Failed to start admission gate");
            return ExitCode::FAILURE;
        }
    };

    let (outcome, code) = match gate.admit(&request).await {
        Ok(context) => {
            info!(project_id = %context.project_id(), "Admitted");
            (json!({ "status": 200, "context": context }), ExitCode::SUCCESS)
        }
        Err(rejection) => (
            json!({
                "status": rejection.status,
                "message": rejection.message,
                "stage": rejection.stage,
            }),
            ExitCode::FAILURE,
        ),
    };

    println!("{}", outcome);
    gate.close().await;
    code
}
