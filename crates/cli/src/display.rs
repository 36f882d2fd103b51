use brewlet_core::{AgentEvent, ChangeDecision, Package, Service};
use chrono::{DateTime, TimeZone};
use colored::*;
use std::fmt::Display;

/// 例如 "Dec 31, 2013 at 5:00 PM"
pub fn format_checked_at<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%b %-d, %Y at %-I:%M %p").to_string()
}

pub fn render_package(package: &Package) -> String {
    let installed = package.installed_version().unwrap_or("?");
    format!(
        "  {} {} {} → {}",
        "→".bright_blue(),
        package.name.bright_white(),
        installed,
        package.stable_version.bright_green()
    )
}

pub fn render_decision(decision: &ChangeDecision) -> Vec<String> {
    if decision.count() == 0 {
        return vec![format!("{}", "✓ 所有包均为最新".bright_green())];
    }

    let mut lines = vec![format!(
        "{}",
        format!("{} 个过期包", decision.count()).bright_yellow()
    )];
    lines.extend(decision.packages().iter().map(render_package));
    lines
}

pub fn render_services(services: &[Service]) -> Vec<String> {
    if services.is_empty() {
        return vec!["没有已安装的服务".to_string()];
    }
    services
        .iter()
        .map(|service| {
            let status = if service.stopped {
                "● stopped".bright_red()
            } else {
                "● running".bright_green()
            };
            format!("  {} {}", status, service.name.bright_white())
        })
        .collect()
}

/// 返回 None 的事件不输出到终端
pub fn render_event(event: &AgentEvent) -> Option<Vec<String>> {
    let lines = match event {
        AgentEvent::OutdatedCountChanged {
            decision,
            checked_at,
        } => {
            let mut lines = render_decision(decision);
            lines.push(format!("  检查于 {}", format_checked_at(checked_at)).dimmed().to_string());
            lines
        }
        AgentEvent::Notify { count, packages } => vec![format!(
            "{} {} 个包可以更新: {}",
            "通知".bright_magenta(),
            count,
            packages.join(", ")
        )],
        AgentEvent::InfoTextUpdated { text } => vec![format!("{} {}", "ℹ".bright_cyan(), text)],
        AgentEvent::AnalyticsStateChanged { enabled } => {
            let state = if *enabled { "开启" } else { "关闭" };
            vec![format!("{} 统计分析: {}", "ℹ".bright_cyan(), state)]
        }
        AgentEvent::ServicesListUpdated { services } => render_services(services),
        AgentEvent::ExportWritten { path } => {
            vec![format!("{} 已导出到 {}", "✓".bright_green(), path.display())]
        }
        AgentEvent::Error { context, message } => {
            vec![format!("{}", format!("错误 [{}]: {}", context, message).bright_red())]
        }
        AgentEvent::InFlightChanged { .. } => return None,
    };
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewlet_core::CommandKind;
    use chrono::Utc;

    #[test]
    fn test_format_checked_at() {
        let at = Utc.with_ymd_and_hms(2013, 12, 31, 17, 0, 0).unwrap();
        assert_eq!(format_checked_at(&at), "Dec 31, 2013 at 5:00 PM");
    }

    #[test]
    fn test_in_flight_is_silent() {
        let event = AgentEvent::InFlightChanged {
            command: CommandKind::Update,
            in_flight: true,
        };
        assert!(render_event(&event).is_none());
    }

    #[test]
    fn test_clean_decision_single_line() {
        colored::control::set_override(false);
        let lines = render_decision(&ChangeDecision::NoChange);
        assert_eq!(lines, vec!["✓ 所有包均为最新"]);
    }

    #[test]
    fn test_services_rendering() {
        colored::control::set_override(false);
        let lines = render_services(&[Service {
            name: "redis".to_string(),
            stopped: true,
        }]);
        assert_eq!(lines, vec!["  ● stopped redis"]);
        assert_eq!(render_services(&[]), vec!["没有已安装的服务"]);
    }
}
