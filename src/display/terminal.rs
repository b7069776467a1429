// src/display/terminal.rs
//! Terminal listener: prints provider events as colored text blocks

use crate::{
    location::Location,
    provider::{LocationListener, ProviderState},
};
use crossterm::{
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::{
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

/// Prints every callback to a writer, stdout by default.
pub struct TerminalListener<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl TerminalListener<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalListener<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_out(&self, render: impl FnOnce(&mut W) -> io::Result<()>) -> anyhow::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        render(&mut *out)?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> LocationListener for TerminalListener<W> {
    fn location_updated(&self, location: &Location) -> anyhow::Result<()> {
        self.with_out(|out| render_location(out, location))
    }

    fn provider_state_changed(&self, state: ProviderState) -> anyhow::Result<()> {
        self.with_out(|out| render_state(out, state))
    }
}

/// Header printed once when watching starts
pub fn render_banner(out: &mut impl Write, source: &str) -> io::Result<()> {
    queue!(
        out,
        SetForegroundColor(Color::Green),
        Print("=".repeat(60)),
        Print("\n"),
        Print(format!("locprobe - watching {} (Ctrl+C to exit)\n", source)),
        Print("=".repeat(60)),
        Print("\n"),
        ResetColor
    )
}

pub fn render_state(out: &mut impl Write, state: ProviderState) -> io::Result<()> {
    let color = match state {
        ProviderState::Available => Color::Green,
        ProviderState::TemporarilyUnavailable => Color::Yellow,
        ProviderState::OutOfService => Color::Red,
    };
    queue!(
        out,
        SetForegroundColor(color),
        Print(format!("STATE: {}\n\n", state)),
        ResetColor
    )
}

pub fn render_location(out: &mut impl Write, location: &Location) -> io::Result<()> {
    let timestamp = location.timestamp().format("%Y-%m-%d %H:%M:%S UTC");
    let Some(coords) = location.qualified_coordinates() else {
        return queue!(
            out,
            SetForegroundColor(Color::DarkGrey),
            Print(format!("LOCATION: no data ({})\n\n", timestamp)),
            ResetColor
        );
    };

    queue!(
        out,
        SetForegroundColor(Color::Yellow),
        Print(format!("POSITION ({}):\n", timestamp)),
        ResetColor,
        Print(format!("  Latitude:  {:>12.6}°\n", coords.latitude())),
        Print(format!("  Longitude: {:>12.6}°\n", coords.longitude())),
        Print(format!("  Altitude:  {}\n", format_value(coords.altitude(), "m")))
    )?;
    if let Some(acc) = coords.horizontal_accuracy() {
        queue!(out, Print(format!("  Accuracy:  {:>12.1} m\n", acc)))?;
    }

    // m/s to km/h
    let speed_kmh = location.speed().map(|s| s * 3.6);
    queue!(
        out,
        SetForegroundColor(Color::Cyan),
        Print("MOVEMENT:\n"),
        ResetColor,
        Print(format!("  Speed:     {}\n", format_value(speed_kmh, "km/h"))),
        Print(format!("  Course:    {}\n\n", format_value(location.course(), "°")))
    )
}

fn format_value(value: Option<f32>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:>12.1} {}", v, unit),
        None => format!("{:>12}", "N/A"),
    }
}
