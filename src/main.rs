use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use answerguard::{
    config::{AppConfig, DEFAULT_API_KEY},
    guardrail::{GuardrailPolicy, PatternSet},
    http::{self, AppState},
    metrics::Metrics,
    model::{MockModelProvider, ModelProvider, OpenAiProvider},
    rate_limit::IpRateLimiter,
    request_log::RequestLog,
    service::AnswerService,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_format);

    if config.api_key == DEFAULT_API_KEY {
        warn!("API_KEY is not set; using the development key");
    }

    let patterns = PatternSet::with_overrides(
        config.injection_patterns.clone(),
        config.sensitive_patterns.clone(),
    )
    .context("failed to compile guardrail patterns")?;
    info!(
        injection_rules = patterns.injection_rules().names().len(),
        sensitive_rules = patterns.sensitive_rules().names().len(),
        "guardrail patterns loaded"
    );
    let policy = GuardrailPolicy::new(
        patterns,
        config.max_question_chars,
        config.mask_sentinel.clone(),
    );

    let model = build_model_provider(&config)?;
    let service = Arc::new(AnswerService::new(
        model,
        policy,
        Arc::new(Metrics::default()),
        Arc::new(RequestLog::new(config.request_log_capacity)),
    ));

    let limiter = Arc::new(IpRateLimiter::per_minute(config.rate_limit_per_minute));
    spawn_limiter_pruning(limiter.clone());

    let app = http::router(AppState {
        service,
        api_key: Arc::from(config.api_key.as_str()),
        limiter,
        cors_origins: cors_origins(&config.frontend_origin),
    });
    let listener = TcpListener::bind(config.http_bind).await?;
    info!("answerguard HTTP API listening on {}", config.http_bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn init_tracing(log_format: &str) {
    let builder =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    if log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn build_model_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let provider = config.model_provider.to_lowercase();
    let openai = || -> anyhow::Result<Option<Arc<dyn ModelProvider>>> {
        let Some(api_key) = config.openai_api_key.clone() else {
            return Ok(None);
        };
        let provider: Arc<dyn ModelProvider> = Arc::new(OpenAiProvider::new(
            api_key,
            config.openai_api_url.clone(),
            config.model_name.clone(),
            Duration::from_secs(config.model_timeout_sec),
        )?);
        Ok(Some(provider))
    };

    match provider.as_str() {
        "mock" => {
            warn!("MODEL_PROVIDER=mock; using mock model provider");
            Ok(Arc::new(MockModelProvider))
        }
        "openai" => match openai()? {
            Some(provider) => {
                info!(model = %config.model_name, "using OpenAI-compatible model provider");
                Ok(provider)
            }
            None => {
                warn!("MODEL_PROVIDER=openai but OPENAI_API_KEY is missing; using mock");
                Ok(Arc::new(MockModelProvider))
            }
        },
        other => {
            if other != "auto" {
                warn!(
                    provider = %other,
                    "unknown MODEL_PROVIDER value; valid values are auto|openai|mock; falling back to auto"
                );
            }
            match openai()? {
                Some(provider) => {
                    info!(model = %config.model_name, "using OpenAI-compatible model provider (auto mode)");
                    Ok(provider)
                }
                None => {
                    warn!("No OPENAI_API_KEY configured; using mock model provider");
                    Ok(Arc::new(MockModelProvider))
                }
            }
        }
    }
}

fn cors_origins(frontend_origin: &str) -> Vec<String> {
    let mut origins = vec![
        frontend_origin.to_owned(),
        "http://127.0.0.1:5500".to_owned(),
        "http://localhost:5500".to_owned(),
    ];
    origins.sort();
    origins.dedup();
    origins
}

fn spawn_limiter_pruning(limiter: Arc<IpRateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.prune();
        }
    });
}
