use clap::ValueEnum;
use colored::Colorize;
use console::Alignment;

use crate::model::{Pipe, Resource, ServiceInfo, ServiceStats, Tunnel};

const UNITS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Format a byte count on a 1024-based scale with up to two decimals,
/// e.g. 1536 -> "1.5 KB".
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut idx = 0;
    let mut scale: u128 = 1;
    while idx + 1 < UNITS.len() && u128::from(bytes) >= scale * 1024 {
        scale *= 1024;
        idx += 1;
    }
    let value = format!("{:.2}", bytes as f64 / scale as f64);
    let value = value.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", value, UNITS[idx])
}

/// Column a collection table can be ordered by. Ordering only affects the
/// rendered table; the published collection is always ordered by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortColumn {
    #[default]
    Id,
    Listener,
    Endpoint,
    Clients,
}

/// Row layout for a resource table.
pub trait Tabular: Resource {
    const TITLE: &'static str;
    const HEADERS: &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

fn opt_display<T: std::fmt::Display>(v: Option<&T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

impl Tabular for Tunnel {
    const TITLE: &'static str = "Tunnels";
    const HEADERS: &'static [&'static str] = &["ID", "LISTENER", "LOCAL", "ENDPOINT", "CLIENTS", "THROUGHPUT"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt_display(self.listener.as_ref()),
            if self.is_listener_local { "true" } else { "false" }.to_string(),
            opt_display(self.endpoint.as_ref()),
            self.clients_count.to_string(),
            self.throughput_string.clone(),
        ]
    }
}

impl Tabular for Pipe {
    const TITLE: &'static str = "Pipes";
    const HEADERS: &'static [&'static str] = &["ID", "LOCAL", "REMOTE", "CLIENTS", "THROUGHPUT"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt_display(self.listener.as_ref()),
            opt_display(self.endpoint.as_ref()),
            self.clients_count.to_string(),
            self.throughput_string.clone(),
        ]
    }
}

/// Order rows for display. Ties fall back to id order.
pub fn sort_rows<R: Resource>(rows: &[R], column: SortColumn) -> Vec<&R> {
    let mut sorted: Vec<&R> = rows.iter().collect();
    match column {
        SortColumn::Id => sorted.sort_by_key(|r| r.id()),
        SortColumn::Listener => sorted.sort_by_key(|r| {
            (r.listener().map(|l| (l.ip.clone(), l.port)), r.id())
        }),
        SortColumn::Endpoint => sorted.sort_by_key(|r| {
            (r.endpoint().map(|e| (e.host.clone(), e.port)), r.id())
        }),
        SortColumn::Clients => sorted.sort_by_key(|r| (r.clients_count(), r.id())),
    }
    sorted
}

/// Render a collection as a table. Stoppable rows carry a ■ marker.
/// Placeholder for a watched view before its first snapshot lands.
pub fn render_loading() -> String {
    format!("{}\n", "Loading…".dimmed())
}

pub fn render_table<R: Tabular>(rows: &[R], column: SortColumn) -> String {
    if rows.is_empty() {
        return format!("{}\n", format!("No active {}.", R::TITLE.to_lowercase()).yellow());
    }

    let sorted = sort_rows(rows, column);
    let cells: Vec<Vec<String>> = sorted.iter().map(|r| r.cells()).collect();

    let widths: Vec<usize> = R::HEADERS
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|c| console::measure_text_width(&c[i]))
                .max()
                .unwrap_or(0)
                .max(h.len())
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = R::HEADERS
        .iter()
        .zip(&widths)
        .map(|(h, w)| pad(&h.dimmed().to_string(), *w))
        .collect();
    out.push_str(&format!("    {}\n", header.join("  ").trim_end()));

    for (row, record) in cells.iter().zip(&sorted) {
        let bullet = if record.clients_count() > 0 {
            "●".green().to_string()
        } else {
            "○".dimmed().to_string()
        };
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (c, w))| {
                let c = if i == 0 { c.bold().to_string() } else { c.to_string() };
                pad(&c, *w)
            })
            .collect();
        let marker = if record.is_stoppable() {
            format!("  {}", "■".red())
        } else {
            String::new()
        };
        out.push_str(&format!("  {} {}{}\n", bullet, line.join("  "), marker));
    }
    out
}

fn missing() -> String {
    "-".dimmed().to_string()
}

fn card(out: &mut String, title: &str, fields: &[(&str, String)]) {
    out.push_str(&format!("{}\n", title.bold()));
    let w = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (k, v) in fields {
        out.push_str(&format!("  {}  {}\n", pad(&k.dimmed().to_string(), w), v));
    }
}

/// Render the home summary: SSH client, tunnels, pipes and global cards.
pub fn render_summary(info: Option<&ServiceInfo>, stats: Option<&ServiceStats>) -> String {
    let mut out = String::new();

    let status = info.map(|i| {
        let s = &i.ssh_client_connection_status;
        if s.eq_ignore_ascii_case("connected") {
            s.green().to_string()
        } else {
            s.yellow().to_string()
        }
    });
    card(
        &mut out,
        "SSH Client",
        &[
            ("Server", info.map(|i| i.ssh_client_uri.clone()).unwrap_or_else(missing)),
            ("Status", status.unwrap_or_else(missing)),
        ],
    );
    if let Some(info) = info.filter(|i| !i.jump_hosts.is_empty()) {
        out.push_str(&format!("  {}\n", "Jump Hosts".dimmed()));
        for host in &info.jump_hosts {
            out.push_str(&format!("    ↳ {}\n", host));
        }
    }
    out.push('\n');

    let num = |f: fn(&ServiceStats) -> u64| stats.map(|s| f(s).to_string()).unwrap_or_else(missing);
    let text = |f: fn(&ServiceStats) -> String| stats.map(f).unwrap_or_else(missing);

    card(
        &mut out,
        "Tunnels",
        &[
            ("Active Tunnels", num(|s| s.count_tunnels)),
            ("Connected Clients", num(|s| s.count_tunnels_clients)),
            ("Total Throughput", text(|s| s.total_tunnel_throughput_string.clone())),
        ],
    );
    out.push('\n');
    card(
        &mut out,
        "Pipes",
        &[
            ("Active Pipes", num(|s| s.count_pipes)),
            ("Connected Clients", num(|s| s.count_pipes_clients)),
            ("Total Throughput", text(|s| s.total_pipe_throughput_string.clone())),
        ],
    );
    out.push('\n');
    card(
        &mut out,
        "Global Stats",
        &[
            ("Workers", num(|s| s.workers)),
            (
                "Allocated Memory",
                stats.map(|s| format_bytes(s.mem_total)).unwrap_or_else(missing),
            ),
        ],
    );
    out
}

/// Pad an ANSI-colored string to a visible width using console's awareness of escape codes.
fn pad(s: &str, width: usize) -> String {
    console::pad_str(s, width, Alignment::Left, None).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endpoint, Listener};

    fn tunnel(id: u64, port: u16, clients: u64, stoppable: bool) -> Tunnel {
        Tunnel {
            id,
            listener: Some(Listener {
                ip: "127.0.0.1".into(),
                port,
            }),
            is_listener_local: true,
            endpoint: Some(Endpoint {
                host: "db".into(),
                port: 5432,
            }),
            is_stoppable: stoppable,
            clients_count: clients,
            throughput_string: "1.2 KB/s".into(),
        }
    }

    #[test]
    fn format_bytes_zero() {
        assert_eq!(format_bytes(0), "0 Bytes");
    }

    #[test]
    fn format_bytes_exact_kilobyte() {
        assert_eq!(format_bytes(1024), "1 KB");
    }

    #[test]
    fn format_bytes_fractional() {
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
    }

    #[test]
    fn format_bytes_small_and_rounded() {
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1100), "1.07 KB");
    }

    #[test]
    fn format_bytes_clamps_to_unit_table() {
        assert_eq!(format_bytes(u64::MAX), "16 EB");
    }

    #[test]
    fn sort_rows_by_clients_then_id() {
        let rows = vec![tunnel(1, 9000, 5, true), tunnel(2, 8000, 0, true), tunnel(3, 7000, 0, true)];
        let ids: Vec<u64> = sort_rows(&rows, SortColumn::Clients).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn sort_rows_by_listener() {
        let rows = vec![tunnel(1, 9000, 0, true), tunnel(2, 8000, 0, true)];
        let ids: Vec<u64> = sort_rows(&rows, SortColumn::Listener).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn empty_table_says_so() {
        let out = render_table::<Tunnel>(&[], SortColumn::Id);
        assert!(out.contains("No active tunnels."));
    }

    #[test]
    fn loading_claims_nothing_about_the_server() {
        let out = render_loading();
        assert!(out.contains("Loading"));
        assert!(!out.contains("No active"));
        assert!(!out.contains('-'));
    }

    #[test]
    fn table_shows_rows_and_stop_marker() {
        let rows = vec![tunnel(1, 2001, 3, true), tunnel(2, 2002, 0, false)];
        let out = render_table(&rows, SortColumn::Id);
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains("127.0.0.1:2001"));
        assert!(out.contains("db:5432"));
        assert!(out.contains("1.2 KB/s"));
        assert_eq!(out.matches('■').count(), 1);
    }

    #[test]
    fn summary_hides_empty_jump_hosts() {
        let info = ServiceInfo {
            ssh_client_uri: "gw:22".into(),
            ssh_client_connection_status: "Connected".into(),
            jump_hosts: vec![],
        };
        let out = render_summary(Some(&info), None);
        assert!(out.contains("gw:22"));
        assert!(!out.contains("Jump Hosts"));
    }

    #[test]
    fn summary_lists_jump_hosts_and_memory() {
        let info = ServiceInfo {
            ssh_client_uri: "gw:22".into(),
            ssh_client_connection_status: "Connected".into(),
            jump_hosts: vec!["bastion-a".into(), "bastion-b".into()],
        };
        let stats = ServiceStats {
            mem_total: 1536,
            workers: 12,
            ..Default::default()
        };
        let out = render_summary(Some(&info), Some(&stats));
        assert!(out.contains("Jump Hosts"));
        assert!(out.contains("bastion-b"));
        assert!(out.contains("1.5 KB"));
        assert!(out.contains("12"));
    }
}
