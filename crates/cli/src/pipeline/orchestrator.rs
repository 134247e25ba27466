//! Pipeline orchestrator - coordinates all components.
//!
//! scanner events -> correlation -> weight enrichment -> resolver -> dispatcher.
//! `--simulate` swaps both serial links for in-memory ones driven by a
//! simulated scale and scanner.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{ChuteResolver, ParcelEvent, ParcelStatus, SerialTransport, SorterBlueprint};
use correlation::{spawn_correlator, CorrelationBuffer};
use dispatcher::{ActuationDispatcher, DefaultChuteResolver};
use observability::ParcelOutcome;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use transport::{MockSerialTransport, ScannerConfig, SimulatedScale, SimulatedScanner};
use weighing::{WeighingSettings, WeightAcquisitionService};

use super::source::forward_scan_records;
use super::PipelineStats;
use crate::error::CliError;

/// Parcels routed concurrently while their weights are looked up
const MAX_ROUTING_IN_FLIGHT: usize = 8;

/// Where scanner events come from
#[derive(Debug, Clone)]
pub enum EventSource {
    /// Simulated scale, scanner and bus
    Simulated {
        interval: Duration,
        noread_ratio: f64,
        seed: u64,
    },
    /// JSON-lines scanner records from a file, "-" for stdin
    JsonLines(String),
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated line configuration
    pub blueprint: SorterBlueprint,

    /// Scanner event source
    pub source: EventSource,

    /// Maximum number of parcels to route (None = unlimited)
    pub max_parcels: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Channel buffer size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Serial links used by one run
struct Links {
    scale: Arc<dyn SerialTransport>,
    bus: Arc<dyn SerialTransport>,
    simulated_scale: Option<SimulatedScale>,
    simulated_bus: Option<Arc<MockSerialTransport>>,
}

impl Links {
    fn build(blueprint: &SorterBlueprint, source: &EventSource) -> Result<Self> {
        if let EventSource::Simulated { .. } = source {
            let scale_link = Arc::new(MockSerialTransport::new("scale"));
            let bus_link = Arc::new(MockSerialTransport::new("actuator"));
            let simulated_scale = SimulatedScale::new(
                scale_link.clone(),
                blueprint.scale.mode,
                blueprint.scale.stable_check_count,
            );
            return Ok(Self {
                scale: scale_link,
                bus: bus_link.clone(),
                simulated_scale: Some(simulated_scale),
                simulated_bus: Some(bus_link),
            });
        }

        let scale = transport::build_transport("scale", &blueprint.scale.transport)
            .map_err(|e| CliError::pipeline_setup("scale link", e))?;
        let bus = transport::build_transport("actuator", &blueprint.actuation.transport)
            .map_err(|e| CliError::pipeline_setup("actuator link", e))?;
        Ok(Self {
            scale,
            bus,
            simulated_scale: None,
            simulated_bus: None,
        })
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let config = self.config;
        let blueprint = &config.blueprint;

        if let Some(port) = config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let links = Links::build(blueprint, &config.source)?;
        if links.simulated_scale.is_some() {
            info!("Running in SIMULATED mode (no devices required)");
        }

        info!("Setting up weighing service...");
        let weighing = WeightAcquisitionService::new(
            links.scale.clone(),
            WeighingSettings::from(&blueprint.scale),
        )
        .map_err(|e| CliError::pipeline_setup("weighing", e))?;

        info!("Setting up actuation dispatcher...");
        let dispatcher = ActuationDispatcher::new(links.bus.clone(), blueprint.to_actuation_plan())
            .map_err(|e| CliError::pipeline_setup("dispatcher", e))?;

        connect_links(&weighing, &dispatcher).await?;

        let dispatcher_handle = dispatcher
            .start()
            .map_err(|e| CliError::pipeline_setup("dispatcher", e))?;
        let resolver = Arc::new(DefaultChuteResolver::from_blueprint(blueprint));
        let noread_token = blueprint.correlation.noread_token.clone();

        let (scan_tx, scan_rx) = mpsc::channel::<ParcelEvent>(config.buffer_size);
        let (parcel_tx, mut parcel_rx) = mpsc::channel::<ParcelEvent>(config.buffer_size);
        let correlator = spawn_correlator(
            CorrelationBuffer::new(&blueprint.correlation),
            scan_rx,
            parcel_tx,
        );
        let source = spawn_source(
            &config.source,
            blueprint,
            config.max_parcels,
            links.simulated_scale.clone(),
            scan_tx,
        )
        .await?;

        info!(max_parcels = ?config.max_parcels, "Pipeline running");

        let mut stats = PipelineStats::default();
        let processing = consume_parcels(
            &mut parcel_rx,
            &weighing,
            resolver,
            &dispatcher,
            &noread_token,
            config.max_parcels,
            &mut stats,
        );

        match config.timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, processing).await.is_err() {
                    warn!(timeout_secs = timeout.as_secs(), "Pipeline timed out");
                }
            }
            None => processing.await,
        }

        // Shutdown
        info!("Shutting down pipeline...");
        source.abort();
        // closing the receiver unblocks a correlator stuck on a full channel
        drop(parcel_rx);
        stats.correlation = match correlator.await {
            Ok(correlation) => correlation,
            Err(e) => {
                warn!(error = %e, "correlator task failed");
                Default::default()
            }
        };

        dispatcher.close();
        if tokio::time::timeout(Duration::from_secs(5), dispatcher_handle.join())
            .await
            .is_err()
        {
            warn!("Dispatcher did not drain in time, cancelling in-flight sequences");
            dispatcher.shutdown();
        }

        let (w, d) = (weighing.clone(), dispatcher.clone());
        if let Err(e) = tokio::task::spawn_blocking(move || {
            w.disconnect();
            d.disconnect();
        })
        .await
        {
            warn!(error = %e, "Link disconnect task failed");
        }

        stats.weighing = weighing.metrics();
        stats.actuation = dispatcher.metrics();
        stats.bus_frames = links.simulated_bus.as_ref().map(|bus| bus.sent_count());
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            throughput = format!("{:.2}", stats.throughput()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Open both links; a link that fails to open is retried on first use
async fn connect_links(
    weighing: &WeightAcquisitionService,
    dispatcher: &ActuationDispatcher,
) -> Result<()> {
    let (w, d) = (weighing.clone(), dispatcher.clone());
    let (scale_ok, bus_ok) = tokio::task::spawn_blocking(move || (w.connect(), d.connect()))
        .await
        .context("Link connect task failed")?;

    if !scale_ok {
        warn!(link = weighing.link_name(), "Scale link not connected, weights may be missing");
    }
    if !bus_ok {
        warn!(link = dispatcher.link_name(), "Actuator link not connected, will retry per parcel");
    }
    info!(scale = scale_ok, actuator = bus_ok, "Links connected");
    Ok(())
}

async fn spawn_source(
    source: &EventSource,
    blueprint: &SorterBlueprint,
    max_parcels: Option<u64>,
    scale: Option<SimulatedScale>,
    tx: mpsc::Sender<ParcelEvent>,
) -> Result<JoinHandle<u64>> {
    match source {
        EventSource::Simulated {
            interval,
            noread_ratio,
            seed,
        } => {
            let mut scanner = ScannerConfig {
                parcels: max_parcels,
                interval: *interval,
                noread_ratio: *noread_ratio,
                seed: *seed,
                ..Default::default()
            };
            if !blueprint.routing.prefixes.is_empty() {
                // one unrouted prefix so the default chute sees traffic too
                scanner.barcode_prefixes = blueprint
                    .routing
                    .prefixes
                    .iter()
                    .map(|route| route.prefix.clone())
                    .chain(std::iter::once("PK".to_string()))
                    .collect();
            }
            Ok(SimulatedScanner::new(scanner).spawn(tx, scale))
        }
        EventSource::JsonLines(path) => {
            let reader: Box<dyn AsyncBufRead + Unpin + Send> = if path == "-" {
                info!("Reading scanner records from stdin");
                Box::new(BufReader::new(tokio::io::stdin()))
            } else {
                info!(path = %path, "Reading scanner records from file");
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| CliError::event_source(path.clone(), e))?;
                Box::new(BufReader::new(file))
            };
            let noread_token = blueprint.correlation.noread_token.clone();
            Ok(tokio::spawn(forward_scan_records(reader, noread_token, tx)))
        }
    }
}

/// Route correlated parcels until the correlator closes or the limit is hit
///
/// Up to `MAX_ROUTING_IN_FLIGHT` parcels wait on the scale at once, so one
/// slow weigh does not hold up the parcels behind it.
async fn consume_parcels<R: ChuteResolver + Send + Sync + 'static>(
    parcels: &mut mpsc::Receiver<ParcelEvent>,
    weighing: &WeightAcquisitionService,
    resolver: Arc<R>,
    dispatcher: &ActuationDispatcher,
    noread_token: &str,
    max_parcels: Option<u64>,
    stats: &mut PipelineStats,
) {
    let mut routing = JoinSet::new();
    let mut taken: u64 = 0;

    loop {
        if routing.len() >= MAX_ROUTING_IN_FLIGHT {
            if let Some(joined) = routing.join_next().await {
                record_outcome(joined, stats);
            }
            continue;
        }

        let parcel = tokio::select! {
            next = parcels.recv() => match next {
                Some(parcel) => parcel,
                None => break,
            },
            Some(joined) = routing.join_next(), if !routing.is_empty() => {
                record_outcome(joined, stats);
                continue;
            }
        };

        let (weighing, resolver, dispatcher) =
            (weighing.clone(), Arc::clone(&resolver), dispatcher.clone());
        let noread_token = noread_token.to_string();
        routing.spawn(async move {
            route_parcel(parcel, &weighing, resolver.as_ref(), &dispatcher, &noread_token).await
        });

        taken += 1;
        if max_parcels.is_some_and(|max| taken >= max) {
            info!(parcels = taken, "Reached max parcels limit");
            break;
        }
    }

    while let Some(joined) = routing.join_next().await {
        record_outcome(joined, stats);
    }
}

fn record_outcome(joined: Result<ParcelOutcome, JoinError>, stats: &mut PipelineStats) {
    match joined {
        Ok(outcome) => stats.record(&outcome),
        Err(e) => warn!(error = %e, "parcel routing task failed"),
    }
}

/// Enrich one parcel with its weight, resolve its chute and queue it
async fn route_parcel<R: ChuteResolver + Sync>(
    mut parcel: ParcelEvent,
    weighing: &WeightAcquisitionService,
    resolver: &R,
    dispatcher: &ActuationDispatcher,
    noread_token: &str,
) -> ParcelOutcome {
    let readable = parcel.has_valid_barcode(noread_token);

    let started = Instant::now();
    let service = weighing.clone();
    let target = parcel.created_at;
    let weight = match tokio::task::spawn_blocking(move || service.find_nearest_weight(target)).await
    {
        Ok(weight) => weight,
        Err(e) => {
            warn!(index = parcel.index, error = %e, "weight lookup task failed");
            None
        }
    };
    let weigh_wait_ms = started.elapsed().as_secs_f64() * 1000.0;

    // a zero sample means the platform was empty
    let weight_grams = weight.filter(|grams| *grams > 0.0);
    if let Some(grams) = weight_grams {
        parcel = parcel.with_weight(grams);
    }
    // images are not forwarded to actuation
    let _ = parcel.take_image();
    parcel.status = ParcelStatus::Enriched;

    let chute = resolver.resolve(&parcel).await;
    let dispatched = match chute {
        Some(chute) => {
            parcel.status = ParcelStatus::Routed;
            parcel.chute = Some(chute);
            observability::record_parcel_routed(chute);
            debug!(
                index = parcel.index,
                barcode = %parcel.barcode,
                weight_grams = parcel.weight_grams,
                chute,
                "parcel routed"
            );
            dispatcher.enqueue(parcel)
        }
        None => {
            warn!(
                index = parcel.index,
                resolver = resolver.name(),
                "no chute decided, parcel not actuated"
            );
            false
        }
    };

    ParcelOutcome {
        readable,
        weight_grams,
        weigh_wait_ms,
        chute,
        dispatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ChuteSequence, CarCommand, PrefixRoute, ScaleConfig, WeighingMode};
    use transport::encode_dynamic_reading;

    fn blueprint() -> SorterBlueprint {
        let toml = r#"
[scale]
mode = "dynamic"
window_lower_ms = -200
window_upper_ms = 100

[actuation]
max_concurrency = 2

[[chutes]]
chute = 3
commands = [{ address = 4 }]

[routing]
default_chute = 3
"#;
        config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_route_parcel_attaches_weight_and_queues() {
        let bp = blueprint();
        let scale = Arc::new(MockSerialTransport::new("scale"));
        let bus = Arc::new(MockSerialTransport::new("actuator"));
        let weighing =
            WeightAcquisitionService::new(scale.clone(), WeighingSettings::from(&bp.scale))
                .unwrap();
        let dispatcher = ActuationDispatcher::new(bus.clone(), bp.to_actuation_plan()).unwrap();
        assert!(weighing.connect());
        assert!(dispatcher.connect());
        let handle = dispatcher.start().unwrap();

        scale.inject_bytes(&encode_dynamic_reading(1.25));
        let parcel = ParcelEvent::new("SF0001", Instant::now(), 1);
        let resolver = DefaultChuteResolver::from_blueprint(&bp);

        let outcome = route_parcel(parcel, &weighing, &resolver, &dispatcher, "NOREAD").await;
        assert!(outcome.readable);
        assert_eq!(outcome.weight_grams, Some(1250.0));
        assert_eq!(outcome.chute, Some(3));
        assert!(outcome.dispatched);

        dispatcher.close();
        handle.join().await;
        assert_eq!(bus.sent_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_route_parcel_without_sample_is_unweighed() {
        let bp = blueprint();
        let scale = Arc::new(MockSerialTransport::new("scale"));
        let bus = Arc::new(MockSerialTransport::new("actuator"));
        let weighing =
            WeightAcquisitionService::new(scale, WeighingSettings::from(&bp.scale)).unwrap();
        let dispatcher = ActuationDispatcher::new(bus, bp.to_actuation_plan()).unwrap();
        let resolver = DefaultChuteResolver::from_blueprint(&bp);

        // never started: the dispatcher refuses the routed parcel
        let parcel = ParcelEvent::new("", Instant::now(), 2);
        let outcome = route_parcel(parcel, &weighing, &resolver, &dispatcher, "NOREAD").await;
        assert!(!outcome.readable);
        assert_eq!(outcome.weight_grams, None);
        assert_eq!(outcome.chute, Some(3));
        assert!(!outcome.dispatched);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_weigh_does_not_hold_up_later_parcels() {
        let mut bp = blueprint();
        bp.scale.window_upper_ms = 300;
        let scale = Arc::new(MockSerialTransport::new("scale"));
        let bus = Arc::new(MockSerialTransport::new("actuator"));
        let weighing =
            WeightAcquisitionService::new(scale, WeighingSettings::from(&bp.scale)).unwrap();
        let dispatcher = ActuationDispatcher::new(bus.clone(), bp.to_actuation_plan()).unwrap();
        assert!(weighing.connect());
        assert!(dispatcher.connect());
        let handle = dispatcher.start().unwrap();
        let resolver = Arc::new(DefaultChuteResolver::from_blueprint(&bp));

        // no samples arrive, so every lookup waits out the window
        let (tx, mut rx) = mpsc::channel(8);
        let now = Instant::now();
        for index in 0..4 {
            tx.send(ParcelEvent::new(format!("SF{index:04}"), now, index))
                .await
                .unwrap();
        }
        drop(tx);

        let mut stats = PipelineStats::default();
        let started = Instant::now();
        consume_parcels(&mut rx, &weighing, resolver, &dispatcher, "NOREAD", None, &mut stats)
            .await;
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(stats.parcels, 4);
        assert_eq!(stats.dispatched, 4);

        dispatcher.close();
        handle.join().await;
        assert_eq!(bus.sent_count(), 4);
    }

    #[tokio::test]
    async fn test_simulated_run_routes_every_parcel() {
        let mut bp = blueprint();
        bp.scale = ScaleConfig {
            mode: WeighingMode::Dynamic,
            ..Default::default()
        };
        bp.chutes.push(ChuteSequence {
            chute: 5,
            run_time_ms: 500,
            commands: vec![CarCommand {
                address: 6,
                reverse: false,
                delay_ms: 0,
            }],
        });
        bp.routing.prefixes = vec![PrefixRoute {
            prefix: "SF".into(),
            chute: 5,
        }];

        let pipeline = Pipeline::new(PipelineConfig {
            blueprint: bp,
            source: EventSource::Simulated {
                interval: Duration::from_millis(250),
                noread_ratio: 0.0,
                seed: 11,
            },
            max_parcels: Some(4),
            timeout: Some(Duration::from_secs(20)),
            buffer_size: 16,
            metrics_port: None,
        });

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.parcels, 4);
        assert_eq!(stats.dispatched, 4);
        assert_eq!(stats.actuation.completed, 4);
        assert_eq!(stats.bus_frames, Some(4));
        assert_eq!(stats.sorting.summary().unweighed_parcels, 0);
    }
}
