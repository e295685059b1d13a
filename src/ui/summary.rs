use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::engine::Engine;
use crate::orchestrator::registry::ContainerStatus;
use crate::orchestrator::{ContainerState, StartOutcome};

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).set_alignment(CellAlignment::Left))
            .collect::<Vec<_>>(),
    );
    table
}

fn print_indented(table: &Table) {
    // Indent the table by 2 spaces
    for line in table.to_string().lines() {
        println!("  {}", line);
    }
}

fn status_text(state: &ContainerState, use_color: bool) -> String {
    let label = if state.running {
        "running".to_string()
    } else {
        state.container.status.to_string()
    };
    if !use_color {
        return format!("\u{25cf} {}", label);
    }
    match (state.running, state.container.status) {
        (true, _) => format!("{} {}", "\u{25cf}".green(), label.green()),
        (false, ContainerStatus::Created) => format!("{} {}", "\u{25cf}".yellow(), label.yellow()),
        (false, _) => format!("{} {}", "\u{25cf}".dimmed(), label.dimmed()),
    }
}

fn ports_text(state: &ContainerState) -> String {
    match state.container.port {
        None => "-".to_string(),
        Some(port) if state.container.secondary_ports.is_empty() => port.to_string(),
        Some(port) => {
            let extra: Vec<String> = state
                .container
                .secondary_ports
                .iter()
                .map(u16::to_string)
                .collect();
            format!("{} ({})", port, extra.join(", "))
        }
    }
}

pub fn print_containers(states: &[ContainerState]) {
    if states.is_empty() {
        println!("No containers found.");
        println!("Run `dbrig create <name> --engine <engine>` to create one.");
        return;
    }
    let use_color = std::io::stdout().is_terminal();
    let mut table = new_table(&["Name", "Engine", "Version", "Port", "Status"]);
    for state in states {
        let c = &state.container;
        table.add_row(vec![
            Cell::new(&c.name),
            Cell::new(c.engine.as_str()),
            Cell::new(&c.version),
            Cell::new(ports_text(state)),
            Cell::new(status_text(state, use_color)),
        ]);
    }
    println!();
    print_indented(&table);
    println!();
}

pub fn print_status(state: &ContainerState) {
    let use_color = std::io::stdout().is_terminal();
    let c = &state.container;
    if use_color {
        println!("  {} ({} {})", c.name.bold(), c.engine, c.version.dimmed());
    } else {
        println!("  {} ({} {})", c.name, c.engine, c.version);
    }
    println!("    Status:  {}", status_text(state, use_color));
    println!("    Detail:  {}", state.message);
    if c.port.is_some() {
        println!("    Ports:   {}", ports_text(state));
    }
    if let Some(ref source) = c.cloned_from {
        println!("    Cloned:  from {}", source);
    }
    println!(
        "    Created: {}",
        c.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

pub fn print_started(outcome: &StartOutcome) {
    let use_color = std::io::stdout().is_terminal();
    if let Some(ref warning) = outcome.warning {
        for line in warning.lines() {
            if use_color {
                eprintln!("  {} {}", "warning:".yellow().bold(), line);
            } else {
                eprintln!("  warning: {}", line);
            }
        }
    }
    let name = &outcome.container.name;
    let verb = if outcome.already_running {
        "already running"
    } else {
        "started"
    };
    match (outcome.pid, use_color) {
        (Some(pid), true) => println!("  {} {} (PID {})", name.bold(), verb.green(), pid),
        (Some(pid), false) => println!("  {} {} (PID {})", name, verb, pid),
        (None, true) => println!("  {} {}", name.bold(), verb.green()),
        (None, false) => println!("  {} {}", name, verb),
    }
    println!("  {}", outcome.connection_string);
}

pub fn print_engines() {
    let mut table = new_table(&["Engine", "Name", "Default port", "Extra ports", "Model"]);
    for engine in Engine::ALL {
        let profile = engine.profile();
        let extra: Vec<String> = profile
            .offsets
            .iter()
            .map(|o| format!("{} {:+}", o.label, o.offset))
            .collect();
        table.add_row(vec![
            Cell::new(engine.as_str()),
            Cell::new(profile.display_name),
            Cell::new(
                profile
                    .default_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(if extra.is_empty() {
                "-".to_string()
            } else {
                extra.join(", ")
            }),
            Cell::new(if engine.is_embedded() { "embedded" } else { "server" }),
        ]);
    }
    println!();
    print_indented(&table);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::registry::Container;

    fn state(running: bool, status: ContainerStatus, port: Option<u16>, secondary: Vec<u16>) -> ContainerState {
        ContainerState {
            container: Container {
                name: "pg".into(),
                engine: Engine::Postgresql,
                version: "17".into(),
                port,
                secondary_ports: secondary,
                status,
                created_at: chrono::Utc::now(),
                cloned_from: None,
                binary_path: None,
            },
            running,
            pid: None,
            message: String::new(),
        }
    }

    #[test]
    fn plain_status_text() {
        assert_eq!(
            status_text(&state(true, ContainerStatus::Running, None, vec![]), false),
            "\u{25cf} running"
        );
        assert_eq!(
            status_text(&state(false, ContainerStatus::Created, None, vec![]), false),
            "\u{25cf} created"
        );
    }

    #[test]
    fn ports_include_secondaries() {
        assert_eq!(ports_text(&state(false, ContainerStatus::Stopped, None, vec![])), "-");
        assert_eq!(
            ports_text(&state(false, ContainerStatus::Stopped, Some(8812), vec![9000, 9009])),
            "8812 (9000, 9009)"
        );
    }
}
