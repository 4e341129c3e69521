use std::env;
use std::net::SocketAddr;

use contracts::{Direction, PlayerRecord, Position};
use plaza_api::serve;
use plaza_core::{CollisionMap, LevelData, WorldView};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn print_usage() {
    println!("plaza-cli <command>");
    println!("commands:");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("    honors PLAZA_LEVEL_PATH, PLAZA_SQLITE_PATH, PLAZA_API_TOKEN");
    println!("  map [level.json]");
    println!("    prints the collision grid, spawn, and rooms of a level");
    println!("  demo <moves> [x] [y]");
    println!("    dry-runs a move sequence offline, e.g. demo right,right,up");
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_moves(value: Option<&String>) -> Result<Vec<Direction>, String> {
    let raw = value.ok_or_else(|| "missing moves".to_string())?;
    raw.split(',')
        .map(|step| Direction::parse(step).ok_or_else(|| format!("invalid move: {step}")))
        .collect()
}

fn parse_coordinate(value: Option<&String>, label: &str, default: i64) -> Result<i64, String> {
    match value {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| format!("invalid {label}: {raw}")),
        None => Ok(default),
    }
}

fn load_level() -> Result<LevelData, String> {
    match env::var("PLAZA_LEVEL_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty())
    {
        Some(path) => LevelData::load(&path)
            .map_err(|err| format!("failed to load level from {path}: {err}")),
        None => Ok(LevelData::default_level()),
    }
}

fn run_map(args: &[String]) -> Result<(), String> {
    let level = match args.get(2) {
        Some(path) => {
            LevelData::load(path).map_err(|err| format!("failed to load level: {err}"))?
        }
        None => load_level()?,
    };

    println!(
        "{} ({}x{}), spawn {}",
        level.name, level.width, level.height, level.spawn
    );

    let map = CollisionMap::from_level(&level);
    for y in 0..map.height() {
        let mut row = String::new();
        for x in 0..map.width() {
            let cell = if Position::new(x, y) == level.spawn {
                '@'
            } else if map.is_blocked(x, y) {
                '#'
            } else {
                '.'
            };
            row.push(cell);
        }
        println!("{row}");
    }

    for room in &level.rooms {
        println!(
            "room {}: pixel rect ({}, {}) {}x{}",
            room.name, room.x, room.y, room.w, room.h
        );
    }

    Ok(())
}

fn run_demo(args: &[String]) -> Result<(), String> {
    let moves = parse_moves(args.get(2))?;
    let level = load_level()?;
    let x = parse_coordinate(args.get(3), "x", level.spawn.x)?;
    let y = parse_coordinate(args.get(4), "y", level.spawn.y)?;

    let walker = PlayerRecord::new(
        "walker",
        "Walker",
        Position::new(x, y),
        Direction::Down,
        "default",
        0,
    );
    let mut view =
        WorldView::new(&level, walker).map_err(|err| format!("invalid start: {err}"))?;

    let total = moves.len();
    let report = view.run_moves(&moves, 0);
    let room = view
        .current_room()
        .map(|room| format!(" ({room})"))
        .unwrap_or_default();
    println!(
        "walked {} of {} steps, now at {}{}",
        report.completed.len(),
        total,
        report.position,
        room
    );

    if let (Some(direction), Some(rejection)) = (report.failed, report.failure) {
        println!(
            "stopped: step '{}' was {}, {} step(s) left untried",
            direction.as_str(),
            rejection.as_str(),
            report.remaining.len()
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                let level = match load_level() {
                    Ok(level) => level,
                    Err(err) => {
                        eprintln!("error: {err}");
                        std::process::exit(1);
                    }
                };

                println!("serving plaza api on http://{addr}");
                if let Err(err) = serve(addr, level).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("map") => {
            if let Err(err) = run_map(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("demo") => {
            if let Err(err) = run_demo(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
