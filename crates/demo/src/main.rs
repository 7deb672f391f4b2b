mod config;
mod simulation;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::time::{self, MissedTickBehavior};

use config::DemoConfig;
use smoothstate::net::loopback;
use smoothstate::{
    Authority, Clock, LoopbackConnection, Millis, Receiver, Simulation, SimulationState,
    SystemClock,
};

#[derive(Parser)]
#[command(name = "smoothstate-demo")]
#[command(about = "Authority and receivers over simulated links")]
struct Args {
    #[arg(short, long, help = "TOML file; flags override its values")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Simulation steps per second")]
    tick_rate: Option<u32>,

    #[arg(short, long, help = "Snapshot broadcasts per second")]
    broadcast_rate: Option<u32>,

    #[arg(short, long)]
    receivers: Option<usize>,

    #[arg(short, long, help = "Playout delay in ms")]
    delay: Option<Millis>,

    #[arg(long, help = "Minimum latency in ms")]
    min_latency: Option<u32>,

    #[arg(long, help = "Maximum latency in ms")]
    max_latency: Option<u32>,

    #[arg(long, help = "Jitter in ms")]
    jitter: Option<u32>,

    #[arg(long, help = "Packet loss percentage (0-100)")]
    loss: Option<f32>,

    #[arg(long, help = "Seconds to run, 0 runs until Ctrl-C")]
    duration: Option<u64>,

    #[arg(long, help = "Render lines per second")]
    render_rate: Option<u32>,
}

impl Args {
    fn resolve(&self) -> Result<DemoConfig> {
        let mut config = match &self.config {
            Some(path) => DemoConfig::load(path)?,
            None => DemoConfig::default(),
        };

        if let Some(rate) = self.tick_rate {
            config.authority.tick_rate = rate;
        }
        if let Some(rate) = self.broadcast_rate {
            config.authority.broadcast_rate = rate;
        }
        if let Some(count) = self.receivers {
            config.receivers = count;
        }
        if let Some(delay) = self.delay {
            config.receiver.delay_ms = delay;
        }
        if let Some(ms) = self.min_latency {
            config.link.min_latency_ms = ms;
        }
        if let Some(ms) = self.max_latency {
            config.link.max_latency_ms = ms;
        }
        if let Some(ms) = self.jitter {
            config.link.jitter_ms = ms;
        }
        if let Some(percent) = self.loss {
            config.link.loss_percent = percent.clamp(0.0, 100.0);
        }
        if let Some(secs) = self.duration {
            config.duration_secs = secs;
        }
        if let Some(rate) = self.render_rate {
            config.render_rate = rate;
        }
        Ok(config)
    }
}

type Step = fn(&SimulationState, f64) -> SimulationState;
type Viewer = Receiver<LoopbackConnection<SystemClock>, SystemClock>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().resolve()?;
    log::debug!("{config:?}");

    let clock = SystemClock;
    let mut authority = Authority::new(config.authority.clone(), clock, simulation::spin as Step);
    let mut receivers: Vec<Viewer> = (0..config.receivers)
        .map(|_| {
            let (authority_side, receiver_side) = loopback::pair(clock, config.link.clone());
            authority.add_connection(authority_side);
            Receiver::new(receiver_side, clock, config.receiver.clone())
        })
        .collect();
    authority.start(simulation::initial_state());

    let mut frame = time::interval(Duration::from_millis(1));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut render = time::interval(Duration::from_secs_f64(
        1.0 / config.render_rate.max(1) as f64,
    ));
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let stats_interval_ms = config.authority.stats_interval_ms;
    let mut stats = time::interval(Duration::from_millis(stats_interval_ms.max(1)));
    stats.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // first tick is immediate
    stats.tick().await;

    let duration = config.duration_secs;
    let deadline = async move {
        match duration {
            0 => std::future::pending::<()>().await,
            secs => time::sleep(Duration::from_secs(secs)).await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = frame.tick() => {
                authority.update();
                for receiver in &mut receivers {
                    receiver.pump();
                }
            }
            _ = render.tick() => render_frame(&authority, &mut receivers),
            _ = stats.tick(), if stats_interval_ms > 0 => {
                for receiver in &receivers {
                    receiver.log_stats();
                }
            }
            _ = &mut deadline => {
                log::info!("{duration} s elapsed");
                break;
            }
            result = &mut ctrl_c => {
                result?;
                log::info!("interrupted");
                break;
            }
        }

        if !authority.is_running() {
            break;
        }
    }

    authority.stop();
    for receiver in &mut receivers {
        receiver.pump();
    }
    summarize(&authority, &receivers);
    Ok(())
}

fn render_frame<K: Clock, S: Simulation>(
    authority: &Authority<K, S>,
    receivers: &mut [Viewer],
) {
    if let Some(state) = authority.state() {
        log::info!("authority  t={:>6} {}", authority.now(), simulation::describe(state));
    }

    for (index, receiver) in receivers.iter_mut().enumerate() {
        match (receiver.virtual_time(), receiver.state()) {
            (Ok(time), Some(state)) => {
                log::info!("receiver {index} t={time:>6} {}", simulation::describe(&state))
            }
            (Ok(_), None) => log::info!("receiver {index} waiting for snapshots"),
            (Err(e), _) => log::info!("receiver {index} {e}"),
        }
        receiver.probe();
    }
}

fn summarize<K: Clock, S: Simulation>(authority: &Authority<K, S>, receivers: &[Viewer]) {
    let stats = authority.stats();
    log::info!(
        "authority ran {} ms: {} ticks, {} broadcasts",
        stats.time_ms,
        stats.ticks,
        stats.broadcasts
    );

    for (index, receiver) in receivers.iter().enumerate() {
        let stats = receiver.stats();
        let link = receiver.connection().stats();
        log::info!(
            "receiver {index}: {} snapshots, offset {:?} ms, rtt {:?} ms, probe {:?} ms, {} dropped on the way out",
            stats.snapshots_received,
            stats.offset_ms,
            stats.round_trip_ms,
            stats.probe_round_trip_ms,
            link.messages_dropped
        );
    }
}
