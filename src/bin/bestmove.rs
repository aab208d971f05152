//! Single-position move probe.
//!
//! Runs one move selection against a FEN and prints where the answer came
//! from along with the search statistics when the search produced it.
//!
//! Usage:
//! `cargo run --release --bin bestmove -- "<fen>|startpos" [depth] [movetime_ms] [threads]`

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use rowan_chess::engine::{Engine, MoveOrigin};
use rowan_chess::position::position::Position;
use rowan_chess::search::options::{SearchLimits, SearchOptions};
use rowan_chess::tables::opening_book::OpeningBook;

fn parse_arg<T>(args: &[String], idx: usize, name: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match args.get(idx) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|err| format!("bad {name} '{raw}': {err}")),
    }
}

fn parse_limits(args: &[String]) -> Result<(u8, u64, usize), String> {
    Ok((
        parse_arg(args, 2, "depth", 6)?,
        parse_arg(args, 3, "movetime_ms", 0)?,
        parse_arg(args, 4, "threads", 0)?,
    ))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let fen = args.get(1).map(String::as_str).unwrap_or("startpos");
    let (depth, movetime_ms, threads) = match parse_limits(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage: bestmove \"<fen>|startpos\" [depth] [movetime_ms] [threads]");
            return ExitCode::FAILURE;
        }
    };

    let mut pos = if fen == "startpos" {
        Position::new()
    } else {
        match Position::from_fen(fen) {
            Ok(pos) => pos,
            Err(err) => {
                eprintln!("bad position: {err}");
                return ExitCode::FAILURE;
            }
        }
    };

    let mut limits = SearchLimits::depth(depth);
    if movetime_ms > 0 {
        limits.move_time = Some(Duration::from_millis(movetime_ms));
    }
    let options = SearchOptions {
        helper_threads: threads,
        ..SearchOptions::default()
    };
    let engine = Engine::default()
        .with_options(options)
        .with_book(OpeningBook::load_default());

    println!("position: {}", pos.fen());
    match engine.select_move(&mut pos, &limits) {
        Ok(choice) => {
            println!("bestmove: {}", choice.best_move);
            match choice.origin {
                MoveOrigin::Book => println!("origin: opening book"),
                MoveOrigin::Tablebase { verdict } => {
                    println!("origin: tablebase ({verdict})");
                }
                MoveOrigin::Search(report) => {
                    println!(
                        "origin: search depth {} score {} ({:?})",
                        report.depth, report.score, report.stop_cause,
                    );
                    println!(
                        "nodes: {} in {:.1} ms ({:.0} nps)",
                        report.nodes,
                        report.elapsed.as_secs_f64() * 1000.0,
                        report.nodes_per_second,
                    );
                    println!(
                        "cache: {} hits / {} misses / {} stores",
                        report.cache.hits, report.cache.misses, report.cache.stores,
                    );
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("selection failed: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn absent_arguments_take_defaults() {
        let parsed = parse_limits(&args(&["bestmove", "startpos"]));
        assert_eq!(parsed, Ok((6, 0, 0)));
    }

    #[test]
    fn well_formed_arguments_parse() {
        let parsed = parse_limits(&args(&["bestmove", "startpos", "8", "250", "3"]));
        assert_eq!(parsed, Ok((8, 250, 3)));
    }

    #[test]
    fn malformed_arguments_are_rejected_not_defaulted() {
        let err = parse_limits(&args(&["bestmove", "startpos", "abc"]))
            .expect_err("non-numeric depth must be rejected");
        assert!(err.contains("depth"));
        assert!(err.contains("abc"));

        let err = parse_limits(&args(&["bestmove", "startpos", "6", "-250"]))
            .expect_err("negative movetime must be rejected");
        assert!(err.contains("movetime_ms"));
    }
}
