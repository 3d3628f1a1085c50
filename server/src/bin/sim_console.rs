//! Operator console: attaches to a scenario or the monitor stream, prints
//! every event and turns typed lines (`start`, `pause`, `stop`, `reset`)
//! into control requests.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use sim_shared::{ControlRequest, ScenarioId, ServerEvent, Snapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server base URL
    #[clap(short, long, default_value = "ws://127.0.0.1:8000")]
    url: String,
    /// Bearer token identifying the operator
    #[clap(short, long)]
    token: Option<String>,
    /// Scenario to observe
    #[clap(short, long, conflicts_with = "monitor")]
    scenario: Option<ScenarioId>,
    /// Watch the global monitor stream instead of a scenario
    #[clap(short, long)]
    monitor: bool,
}

fn print_snapshot(snapshot: &Snapshot) {
    println!(
        "[{}] {} ({}) {} aircraft, state {}",
        snapshot.timestamp.format("%H:%M:%S"),
        snapshot.scenario_name,
        snapshot.scenario_id,
        snapshot.aircraft_count,
        snapshot.state
    );
    for aircraft in &snapshot.aircraft {
        let pos = &aircraft.sim_position;
        println!(
            "    {:<12} {:<16} {:?} {:>10.5} {:>11.5} {:>8.0}m",
            aircraft.external_id,
            aircraft.name,
            aircraft.sim_status,
            pos.latitude,
            pos.longitude,
            pos.altitude_m
        );
    }
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::Info {
            message,
            scenario_name,
            sim_state,
            can_control,
            available_actions,
            initial_snapshot,
            ..
        } => {
            println!("{} '{}' (state {})", message, scenario_name, sim_state);
            if *can_control {
                let actions: Vec<_> = available_actions.iter().map(|a| a.as_str()).collect();
                println!("You may control this simulation: {}", actions.join(", "));
            } else {
                println!("Observing only");
            }
            print_snapshot(initial_snapshot);
        }
        ServerEvent::Snapshot(snapshot) => print_snapshot(snapshot),
        ServerEvent::ControlAck {
            action,
            state,
            by_user,
            ..
        } => println!(
            "{} by {} -> {}",
            action,
            by_user.as_deref().unwrap_or("anonymous"),
            state
        ),
        ServerEvent::SimulationState {
            scenario_id,
            scenario_name,
            state,
            by_user,
            ..
        } => println!(
            "Scenario {} ({}) is now {} ({})",
            scenario_id,
            scenario_name,
            state,
            by_user.as_deref().unwrap_or("anonymous")
        ),
        ServerEvent::MonitorSnapshot { simulations, .. } => {
            println!("{} simulations known", simulations.len());
            for sim in simulations {
                println!(
                    "    {:>4} {:<24} {:<8} started by {}",
                    sim.scenario_id,
                    sim.scenario_name,
                    sim.state,
                    sim.started_by.as_deref().unwrap_or("-")
                );
            }
        }
        ServerEvent::Error { error } => println!("Error: {}", error),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let base = args.url.trim_end_matches('/');
    let url = match (args.scenario, args.monitor) {
        (Some(id), false) => format!("{}/ws/simulation/{}/", base, id),
        (None, true) => format!("{}/ws/simulations/monitor/", base),
        _ => return Err("pass either --scenario <id> or --monitor".into()),
    };

    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = &args.token {
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }

    let (ws, _) = connect_async(request).await?;
    info!("Connected to {}", url);
    let (mut sink, mut source) = ws.split();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = !args.monitor;

    loop {
        tokio::select! {
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => print_event(&event),
                            Err(e) => warn!("Unrecognized event: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        println!("Server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Connection error: {}", e);
                        break;
                    }
                }
            }

            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) if !line.trim().is_empty() => {
                        let request = ControlRequest { action: line.trim().to_string() };
                        let json = serde_json::to_string(&request)?;
                        debug!("Sending {}", json);
                        sink.send(Message::text(json)).await?;
                    }
                    Some(_) => {}
                    None => stdin_open = false,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!("Disconnecting...");
                let _ = sink.close().await;
                break;
            }
        }
    }

    Ok(())
}
