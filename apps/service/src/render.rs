use crate::database::models::Monitor;
use crate::error::MonitorError;
use crate::monitoring::MonitorEvent;
use crate::monitoring::types::MonitorSnapshot;

/// `monitor(<id>): <name> => (<url>) => (<status>)`
pub fn render_snapshot(snapshot: &MonitorSnapshot) -> String {
    render_line(&snapshot.monitor, &snapshot.status())
}

/// Line printed for a scheduler event. Errors that recorded nothing carry no
/// snapshot and are printed with the error in place of the status.
pub fn render_event(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::Success { snapshot } | MonitorEvent::Error { snapshot: Some(snapshot), .. } => {
            render_snapshot(snapshot)
        }
        MonitorEvent::Error { monitor, snapshot: None, error } => render_error(monitor, error),
    }
}

fn render_error(monitor: &Monitor, error: &MonitorError) -> String {
    render_line(monitor, &format_args!("error: {error}"))
}

fn render_line(monitor: &Monitor, status: &dyn std::fmt::Display) -> String {
    format!("monitor({}): {} => ({}) => ({})", monitor.id, monitor.name, monitor.url, status)
}
