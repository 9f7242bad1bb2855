//! Digital-twin signal generator
//!
//! Publishes `STATUS:VALUE` telemetry to the bridge's topic so the whole
//! path can be exercised without sensor hardware.
//!
//! ## Usage
//!
//! ```bash
//! # 20 packets of a smooth sine wave, one every 500 ms
//! signal-generator --mode normal
//!
//! # Fault spikes against a local broker
//! signal-generator --broker-url tcp://localhost:1883 --mode anomaly --count 5
//!
//! # Idle noise, faster
//! signal-generator --mode idle --interval-ms 100
//! ```

use clap::Parser;
use rumqttc::{AsyncClient, Event, Incoming, QoS};
use std::time::Duration;
use telemetry_bridge::config::{BrokerSection, DEFAULT_TOPIC};
use telemetry_bridge::observability::init_default_logging;
use telemetry_bridge::protocol::SensorStatus;
use telemetry_bridge::transport::mqtt::{generate_client_id, BrokerAddress};
use telemetry_bridge::transport::mqtt::connection::{
    configure_mqtt_options, configure_network_options,
};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Largest reading a 12-bit ADC produces
const ADC_MAX: i32 = 4095;

const NORMAL_CENTER: f64 = 2048.0;
const NORMAL_AMPLITUDE: f64 = 800.0;
const NORMAL_NOISE: i32 = 50;
/// Radians advanced per packet
const NORMAL_STEP: f64 = 0.5;

const ANOMALY_HIGH_MIN: i32 = 3800;
const ANOMALY_LOW_MAX: i32 = 200;

const IDLE_CENTER: i32 = 512;
const IDLE_NOISE: i32 = 30;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Publish simulated sensor telemetry
#[derive(Parser)]
#[command(name = "signal-generator")]
#[command(about = "Publish simulated STATUS:VALUE sensor telemetry")]
#[command(version)]
struct Args {
    /// MQTT broker URL
    #[arg(long, default_value = "tcp://test.mosquitto.org:1883")]
    broker_url: String,

    /// Topic to publish on
    #[arg(long, default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Signal shape to generate
    #[arg(short, long, default_value = "normal")]
    mode: SignalMode,

    /// Number of packets to publish
    #[arg(short, long, default_value_t = 20)]
    count: u32,

    /// Delay between packets in milliseconds
    #[arg(short, long, default_value_t = 500)]
    interval_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum SignalMode {
    /// Sine wave inside the safe band
    Normal,
    /// Extreme spikes at either end of the ADC range
    Anomaly,
    /// Low steady noise
    Idle,
}

impl SignalMode {
    fn status(self) -> SensorStatus {
        match self {
            SignalMode::Normal => SensorStatus::Normal,
            SignalMode::Anomaly => SensorStatus::Fault,
            SignalMode::Idle => SensorStatus::Idle,
        }
    }
}

/// Uniform integer in `low..=high`
fn random_in(low: i32, high: i32) -> i32 {
    let span = (high - low + 1) as u128;
    low + (Uuid::new_v4().as_u128() % span) as i32
}

fn clamp_reading(value: i32) -> u16 {
    value.clamp(0, ADC_MAX) as u16
}

fn normal_reading(step: u64, noise: i32) -> u16 {
    let wave = NORMAL_CENTER + NORMAL_AMPLITUDE * (step as f64 * NORMAL_STEP).sin();
    clamp_reading(wave as i32 + noise)
}

/// `high` picks the upper spike band, `offset` is the position inside the band
fn anomaly_reading(high: bool, offset: i32) -> u16 {
    if high {
        clamp_reading(ANOMALY_HIGH_MIN + offset.clamp(0, ADC_MAX - ANOMALY_HIGH_MIN))
    } else {
        clamp_reading(offset.clamp(0, ANOMALY_LOW_MAX))
    }
}

fn idle_reading(noise: i32) -> u16 {
    clamp_reading(IDLE_CENTER + noise.clamp(-IDLE_NOISE, IDLE_NOISE))
}

fn sample(mode: SignalMode, step: u64) -> u16 {
    match mode {
        SignalMode::Normal => normal_reading(step, random_in(-NORMAL_NOISE, NORMAL_NOISE)),
        SignalMode::Anomaly => {
            let high = random_in(0, 1) == 1;
            let offset = if high {
                random_in(0, ADC_MAX - ANOMALY_HIGH_MIN)
            } else {
                random_in(0, ANOMALY_LOW_MAX)
            };
            anomaly_reading(high, offset)
        }
        SignalMode::Idle => idle_reading(random_in(-IDLE_NOISE, IDLE_NOISE)),
    }
}

fn format_payload(status: SensorStatus, value: u16) -> String {
    format!("{status}:{value}")
}

#[tokio::main]
async fn main() {
    init_default_logging();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Signal generator failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let address = BrokerAddress::parse(&args.broker_url)?;
    let broker = BrokerSection {
        broker_url: args.broker_url.clone(),
        topic: args.topic.clone(),
        ..BrokerSection::default()
    };
    let client_id = generate_client_id("siggen");
    let options = configure_mqtt_options(&client_id, &address, &broker);
    let (client, mut event_loop) = AsyncClient::new(options, 10);
    event_loop.set_network_options(configure_network_options(&broker));
    let connect_timeout = Duration::from_secs(broker.connect_timeout_secs);

    // Drive the event loop in the background; report the first CONNACK
    let (connected_tx, connected_rx) = oneshot::channel();
    let driver = tokio::spawn(async move {
        let mut connected_tx = Some(connected_tx);
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    if let Some(tx) = connected_tx.take() {
                        let _ = tx.send(());
                    }
                }
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT event loop stopped: {}", e);
                    break;
                }
            }
        }
    });

    info!("Connecting to broker {} as {}", address, client_id);
    match timeout(connect_timeout, connected_rx).await {
        Ok(Ok(())) => info!("Connected, target topic: {}", args.topic),
        Ok(Err(_)) => return Err("connection failed before acknowledgment".into()),
        Err(_) => return Err(format!("no CONNACK within {connect_timeout:?}").into()),
    }

    let status = args.mode.status();
    info!(
        "Injecting {} packets for mode {:?} ({})",
        args.count, args.mode, status
    );

    for step in 0..u64::from(args.count) {
        let payload = format_payload(status, sample(args.mode, step));
        client
            .publish(args.topic.clone(), QoS::AtLeastOnce, false, payload.clone())
            .await?;
        info!("TX -> {}", payload);
        sleep(Duration::from_millis(args.interval_ms)).await;
    }

    client.disconnect().await?;
    if timeout(DRAIN_TIMEOUT, driver).await.is_err() {
        warn!("Event loop did not drain within {:?}", DRAIN_TIMEOUT);
    }
    info!("Disconnected");
    Ok(())
}
