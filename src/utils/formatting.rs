//! Formatting utilities for CLI output.

pub fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

pub fn pad_right(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}

pub fn pad_left(s: &str, width: usize) -> String {
    format!("{:>width$}", s, width = width)
}

pub fn mins2readable(mins: i64, want_sign: bool, short: bool) -> String {
    let abs_m = mins.abs();
    let hours = abs_m / 60;
    let minutes = abs_m % 60;

    let sign = if mins > 0 && want_sign {
        "+"
    } else if mins < 0 && want_sign {
        "-"
    } else {
        "" // zero → nessun segno
    };

    if short {
        // es: +02:25 oppure -01:10
        format!("{}{:02}:{:02}", sign, hours, minutes)
    } else {
        // es: +02h 25m oppure -01h 10m
        format!("{}{:02}h {:02}m", sign, hours, minutes)
    }
}

/// Restituisce una descrizione testuale e un colore ANSI per la sorgente
/// di una sessione. Usata nei test e negli output human-readable.
pub fn describe_source(code: &str) -> (String, &'static str) {
    match code.to_lowercase().as_str() {
        "gps" => ("GPS".into(), "\x1b[34m"),
        "headless" => ("Headless GPS".into(), "\x1b[36m"),
        "manual" => ("Manual".into(), "\x1b[33m"),
        "voice" => ("Voice".into(), "\x1b[35m"),
        "secretary" => ("AI Secretary".into(), "\x1b[45;97;1m"),
        other => (other.to_string(), "\x1b[0m"),
    }
}
