//! # Integration Tests
//!
//! End-to-end tests across the sorter crates.
//!
//! Covers:
//! - Sample configuration loading and plan resolution
//! - Simulated scale -> weighing service
//! - Scanner events -> correlation -> resolver -> dispatcher -> bus frames

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};

    const SAMPLE: &str = include_str!("../../../configs/line.toml");

    #[test]
    fn test_sample_config_is_valid() {
        let blueprint = ConfigLoader::load_from_str(SAMPLE, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.chutes.len(), 4);
        assert_eq!(blueprint.routing.noread_chute, Some(9));

        let plan = blueprint.to_actuation_plan();
        let chute = plan.chute(2).unwrap();
        assert_eq!(chute.cars[1].address, 4);
        assert_eq!(chute.cars[1].speed_rpm, 900);
        assert_eq!(chute.cars[0].speed_rpm, 600);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ChuteResolver, ParcelEvent, SorterBlueprint, WeighingMode, DEFAULT_NOREAD_TOKEN,
    };
    use correlation::{spawn_correlator, CorrelationBuffer};
    use dispatcher::{ActuationDispatcher, CancellationToken, DefaultChuteResolver};
    use frame_codec::encode_actuator_frame;
    use tokio::sync::mpsc;
    use transport::{encode_dynamic_reading, MockSerialTransport, SimulatedScale};
    use weighing::{WeighingSettings, WeightAcquisitionService};

    const SAMPLE: &str = include_str!("../../../configs/line.toml");

    fn sample() -> SorterBlueprint {
        ConfigLoader::load_from_str(SAMPLE, ConfigFormat::Toml).unwrap()
    }

    fn bus(blueprint: &SorterBlueprint) -> (ActuationDispatcher, Arc<MockSerialTransport>) {
        let mock = Arc::new(MockSerialTransport::new("actuator"));
        let dispatcher =
            ActuationDispatcher::new(mock.clone(), blueprint.to_actuation_plan()).unwrap();
        assert!(dispatcher.connect());
        (dispatcher, mock)
    }

    fn scale(mode: WeighingMode) -> (WeightAcquisitionService, Arc<MockSerialTransport>) {
        let mut blueprint = sample();
        blueprint.scale.mode = mode;
        let mock = Arc::new(MockSerialTransport::new("scale"));
        let service =
            WeightAcquisitionService::new(mock.clone(), WeighingSettings::from(&blueprint.scale))
                .unwrap();
        assert!(service.connect());
        (service, mock)
    }

    /// Sample config -> dispatcher: frames carry the resolved car tuning in order
    #[tokio::test]
    async fn test_sample_chute_sends_resolved_frames() {
        let blueprint = sample();
        let (dispatcher, mock) = bus(&blueprint);

        let parcel = ParcelEvent::new("SF0000000001", Instant::now(), 1).with_chute(2);
        assert!(
            dispatcher
                .dispatch_to_chute(&parcel, &CancellationToken::new())
                .await
        );

        let expected = vec![
            encode_actuator_frame(1, false, 600, 600, 0, 0)
                .unwrap()
                .as_bytes()
                .to_vec(),
            encode_actuator_frame(4, true, 600, 900, 0, 1)
                .unwrap()
                .as_bytes()
                .to_vec(),
        ];
        assert_eq!(mock.sent_frames(), expected);
        assert_eq!(dispatcher.metrics().completed, 1);
    }

    /// Simulated static scale -> stability window -> weight query
    #[test]
    fn test_simulated_static_scale_weighs_parcel() {
        let (service, mock) = scale(WeighingMode::Static);
        let simulated = SimulatedScale::new(mock, WeighingMode::Static, 5);

        simulated.present(2.4);
        let weight = service.find_nearest_weight(Instant::now()).unwrap();
        assert!((weight - 2400.0).abs() < 1e-6, "got {weight}");
        assert_eq!(service.metrics().samples_published, 1);
        assert_eq!(service.metrics().query_hits, 1);
    }

    /// A weight landing after the scan is still matched inside the window
    #[test]
    fn test_late_weight_is_awaited() {
        let (service, mock) = scale(WeighingMode::Dynamic);
        let target = Instant::now();

        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            mock.inject_bytes(&encode_dynamic_reading(0.8));
        });

        let weight = service.find_nearest_weight(target);
        feeder.join().unwrap();
        assert_eq!(weight, Some(800.0));
        assert!(target.elapsed() < Duration::from_millis(500));
    }

    /// Losing the scale link ends the wait early without a weight
    #[test]
    fn test_scale_link_loss_ends_wait() {
        let (service, mock) = scale(WeighingMode::Dynamic);
        let target = Instant::now();

        let dropper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            mock.set_connected(false);
        });

        assert_eq!(service.find_nearest_weight(target), None);
        dropper.join().unwrap();
        assert!(target.elapsed() < Duration::from_millis(400));
        assert_eq!(service.metrics().query_misses, 1);
    }

    /// Scanner burst -> correlator -> resolver -> dispatcher -> bus
    #[tokio::test]
    async fn test_burst_routes_to_prefix_chute() {
        let blueprint = sample();
        let (dispatcher, mock) = bus(&blueprint);
        let handle = dispatcher.start().unwrap();
        let resolver = DefaultChuteResolver::from_blueprint(&blueprint);

        let (scan_tx, scan_rx) = mpsc::channel(8);
        let (parcel_tx, mut parcel_rx) = mpsc::channel(8);
        let correlator = spawn_correlator(
            CorrelationBuffer::new(&blueprint.correlation),
            scan_rx,
            parcel_tx,
        );

        let t0 = Instant::now();
        scan_tx
            .send(ParcelEvent::new(DEFAULT_NOREAD_TOKEN, t0, 1))
            .await
            .unwrap();
        scan_tx
            .send(ParcelEvent::new(" JD77 ", t0, 2))
            .await
            .unwrap();
        scan_tx
            .send(ParcelEvent::new("", t0, 3).with_dimensions(300.0, 200.0, 100.0))
            .await
            .unwrap();
        drop(scan_tx);

        let mut parcel = parcel_rx.recv().await.unwrap();
        assert!(parcel_rx.recv().await.is_none());
        assert_eq!(parcel.barcode, "JD77");
        assert!(parcel.has_dimensions());
        assert_eq!(parcel.created_at, t0);

        let chute = resolver.resolve(&parcel).await.unwrap();
        assert_eq!(chute, 3);
        parcel.chute = Some(chute);
        assert!(dispatcher.enqueue(parcel));

        dispatcher.close();
        handle.join().await;

        let stats = correlator.await.unwrap();
        assert_eq!(stats.events_ingested, 3);
        assert_eq!(stats.reads_merged(), 2);

        // chute 3 fires cars 5 and 6
        assert_eq!(mock.sent_count(), 2);
        assert_eq!(dispatcher.metrics().commands_sent, 2);
        assert_eq!(dispatcher.metrics().completed, 1);
    }

    /// Repeat reads of a parcel in later bursts are dropped
    #[test]
    fn test_repeat_bursts_suppressed() {
        let blueprint = sample();
        let mut buffer = CorrelationBuffer::new(&blueprint.correlation);
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        assert!(buffer
            .ingest_parcel_event(ParcelEvent::new("SF1", at(0), 1), at(0))
            .is_none());
        let first = buffer
            .ingest_parcel_event(ParcelEvent::new("SF1", at(300), 2), at(300))
            .unwrap();
        assert_eq!(first.barcode, "SF1");
        assert!(buffer
            .ingest_parcel_event(ParcelEvent::new("YT2", at(600), 3), at(600))
            .is_none());
        let second = buffer.flush().unwrap();
        assert_eq!(second.barcode, "YT2");

        let stats = buffer.stats();
        assert_eq!(stats.records_released, 2);
        assert_eq!(stats.duplicates_suppressed, 1);
    }

    /// Unreadable parcels go to the exception chute and still actuate
    #[tokio::test]
    async fn test_noread_parcel_goes_to_exception_chute() {
        let blueprint = sample();
        let (dispatcher, mock) = bus(&blueprint);
        let resolver = DefaultChuteResolver::from_blueprint(&blueprint);

        let parcel = ParcelEvent::new(DEFAULT_NOREAD_TOKEN, Instant::now(), 1);
        let chute = resolver.resolve(&parcel).await.unwrap();
        assert_eq!(chute, 9);

        let parcel = parcel.with_chute(chute);
        assert!(
            dispatcher
                .dispatch_to_chute(&parcel, &CancellationToken::new())
                .await
        );
        let expected = encode_actuator_frame(7, true, 500, 600, 0, 0).unwrap();
        assert_eq!(mock.sent_frames(), vec![expected.as_bytes().to_vec()]);
    }
}
