use std::time::Duration;

use parley_core::config::{AppConfig, LoadOptions};
use parley_slack::{actions::ensure_ok, time_limit::with_time_limit, web::WebApiClient};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{json, Value};

use crate::commands::CommandResult;

const AUTH_CHECK_LIMIT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_token_prefixes(&config));
            checks.push(check_slack_auth(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("slack_token_readiness", "configuration did not load"));
            checks.push(DoctorCheck::skipped("slack_auth", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Fails when either token carries the other kind's prefix, or when the bot id
/// is not a user id.
fn check_token_prefixes(config: &AppConfig) -> DoctorCheck {
    let prefix = |token: &str| token.split_once('-').map(|(prefix, _)| prefix.to_owned());
    let app = prefix(config.slack.app_token.expose_secret());
    let bot = prefix(config.slack.bot_token.expose_secret());
    let details = format!(
        "app token `{}-`, bot token `{}-`, bot id `{}`",
        app.as_deref().unwrap_or("?"),
        bot.as_deref().unwrap_or("?"),
        config.slack.bot_id
    );

    let mut problems = Vec::new();
    if app.as_deref() != Some("xapp") {
        problems.push("app token must be an app-level `xapp-` token");
    }
    if bot.as_deref() != Some("xoxb") {
        problems.push("bot token must be a bot `xoxb-` token");
    }
    if !config.slack.bot_id.starts_with(['U', 'W', 'B']) {
        problems.push("bot id should be a user id starting with `U`, `W` or `B`");
    }

    if problems.is_empty() {
        DoctorCheck { name: "slack_token_readiness", status: CheckStatus::Pass, details }
    } else {
        DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Fail,
            details: format!("{details}: {}", problems.join("; ")),
        }
    }
}

/// Calls `auth.test` with the bot token and checks it belongs to the
/// configured bot id.
fn check_slack_auth(config: &AppConfig) -> DoctorCheck {
    let fail = |details: String| DoctorCheck { name: "slack_auth", status: CheckStatus::Fail, details };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return fail(format!("failed to initialize async runtime: {error}")),
    };

    let result = runtime.block_on(async {
        let client = WebApiClient::new(&config.slack.api_base_url, config.slack.bot_token.clone())
            .map_err(|error| error.to_string())?;
        let reply = with_time_limit(AUTH_CHECK_LIMIT, client.call("auth.test", &json!({})))
            .await
            .map_err(|signal| signal.to_string())?
            .map_err(|error| error.to_string())?;
        ensure_ok("auth.test", &reply).map_err(|error| error.to_string())?;
        Ok::<Value, String>(reply)
    });

    let reply = match result {
        Ok(reply) => reply,
        Err(error) => return fail(error),
    };
    let field = |key: &str| reply.get(key).and_then(Value::as_str).unwrap_or("unknown");
    if field("user_id") != config.slack.bot_id {
        return fail(format!(
            "token belongs to `{}`, not the configured bot id `{}`",
            field("user_id"),
            config.slack.bot_id
        ));
    }

    DoctorCheck {
        name: "slack_auth",
        status: CheckStatus::Pass,
        details: format!("authenticated as `{}` in team `{}`", field("user"), field("team")),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
