//! Commands that talk to a running daemon over the control socket.

use std::fmt::Write as _;

use agendawall_protocol::{Request, Response, StatusInfo};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::socket::ControlClient;

fn client(config: &ClientConfig) -> ControlClient {
    ControlClient::new(config.socket_path(), config.request_timeout())
}

fn unexpected(response: Response) -> ClientError {
    ClientError::Protocol(format!("unexpected response: {:?}", response))
}

pub async fn ping(config: &ClientConfig) -> ClientResult<()> {
    match client(config).call(Request::Ping).await? {
        Response::Pong => {
            println!("pong");
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

pub async fn status(config: &ClientConfig, json: bool) -> ClientResult<()> {
    let info = match client(config).call(Request::Status).await? {
        Response::Status(info) => info,
        other => return Err(unexpected(other)),
    };

    if json {
        let text = serde_json::to_string_pretty(&info)
            .map_err(|e| ClientError::Protocol(format!("failed to encode status: {}", e)))?;
        println!("{}", text);
    } else {
        print!("{}", format_status(&info));
    }
    Ok(())
}

/// Refetches the timetable and waits for the swap.
pub async fn refresh(config: &ClientConfig) -> ClientResult<()> {
    match client(config).call(Request::RefreshTimetable).await? {
        Response::Refreshed {
            event_id,
            version,
            day_count,
            session_count,
        } => {
            println!(
                "timetable-{} refreshed (version {}, {} days, {} sessions)",
                event_id, version, day_count, session_count
            );
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

pub async fn resync(config: &ClientConfig) -> ClientResult<()> {
    expect_ok(client(config).call(Request::ResyncClock).await?)?;
    println!("clock resynchronized");
    Ok(())
}

/// Moves the virtual clock; `input` is read in the configured event zone.
pub async fn set_now(config: &ClientConfig, input: &str) -> ClientResult<()> {
    let now = config.parse_time(input)?;
    expect_ok(client(config).call(Request::set_now(now.fixed_offset())).await?)?;
    println!("clock set to {}", now.format("%Y-%m-%d %H:%M:%S %Z"));
    Ok(())
}

pub async fn shutdown(config: &ClientConfig) -> ClientResult<()> {
    expect_ok(client(config).call(Request::Shutdown).await?)?;
    println!("daemon shutting down");
    Ok(())
}

fn expect_ok(response: Response) -> ClientResult<()> {
    match response {
        Response::Ok => Ok(()),
        other => Err(unexpected(other)),
    }
}

/// Human-readable status report.
pub fn format_status(info: &StatusInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "event:        {}", info.event_id);
    let _ = writeln!(out, "uptime:       {}", format_uptime(info.uptime_seconds));
    let _ = writeln!(out, "timetable:    version {}", info.timetable_version);
    match info.last_refresh {
        Some(at) => {
            let _ = writeln!(out, "last refresh: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => {
            let _ = writeln!(out, "last refresh: never");
        }
    }
    if let Some(ref error) = info.last_refresh_error {
        let kind = if info.last_refresh_retryable {
            " (transient)"
        } else {
            ""
        };
        let _ = writeln!(out, "refresh error: {}{}", error, kind);
    }
    let _ = writeln!(
        out,
        "clock:        {} ({})",
        info.virtual_now.format("%Y-%m-%d %H:%M:%S %:z"),
        info.clock_mode.as_str()
    );
    let _ = writeln!(
        out,
        "ticks:        {} ({} skipped)",
        info.ticks, info.skipped_ticks
    );
    if let Some(ref error) = info.last_tick_error {
        let _ = writeln!(out, "tick error:   {}", error);
    }
    let _ = writeln!(out, "viewers:      {}", info.subscribers);
    out
}

fn format_uptime(seconds: u64) -> String {
    let (hours, rest) = (seconds / 3600, seconds % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
