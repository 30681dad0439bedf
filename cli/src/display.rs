use std::io::{self, IsTerminal, Write};

use termcolor::{self, Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use base::prelude::*;
use bus::clockgen::{FrequencyTable, DEFAULT_CLOCK_HZ};

fn get_colour_choice() -> termcolor::ColorChoice {
    if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn kind_colour(kind: EventKind) -> Color {
    match kind {
        EventKind::MemRead => Color::Green,
        EventKind::MemWrite => Color::Yellow,
        EventKind::IoRead => Color::Cyan,
        EventKind::IoWrite => Color::Magenta,
        EventKind::Unused => Color::White,
    }
}

/// Lists events in the monitor's `AAAAA|B|TY|DDDD` format, one per
/// line, numbered from 0.
pub fn print_events(events: &[BusEvent]) -> io::Result<()> {
    let mut stream = StandardStream::stdout(get_colour_choice());
    writeln!(stream, "{:>6} ADDR |B|TY|DATA", "#")?;
    for (i, ev) in events.iter().enumerate() {
        let mut colour = ColorSpec::new();
        colour.set_fg(Some(kind_colour(ev.kind)));
        stream.set_color(&colour)?;
        write!(stream, "{i:>6} {ev}")?;
        stream.reset()?;
        writeln!(stream)?;
    }
    Ok(())
}

pub fn print_clocks(table: &FrequencyTable) -> io::Result<()> {
    let mut stream = StandardStream::stdout(get_colour_choice());
    for s in table.settings() {
        let name = s.to_string();
        write!(
            stream,
            "{name:>8}  wrap {:>4}  divider {:>9.4}  actual {:>12.1} Hz",
            s.wrap,
            s.divider,
            s.output_hz()
        )?;
        if s.hz == DEFAULT_CLOCK_HZ {
            stream.set_color(ColorSpec::new().set_bold(true))?;
            write!(stream, "  (default)")?;
            stream.reset()?;
        }
        writeln!(stream)?;
    }
    Ok(())
}
