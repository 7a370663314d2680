use htknx::error::DeviceError;
use htknx::*;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::Level;

fn address() -> GroupAddress {
    GroupAddress::new(1, 2, 3).unwrap()
}

fn config(value_type: ValueType) -> DatapointConfig {
    DatapointConfig {
        group_address: address(),
        value_type,
        writable: false,
        cyclic_sending: false,
        send_on_change: true,
        on_change_of: None,
    }
}

fn setup(config: DatapointConfig) -> (Datapoint, Arc<MemoryBus>, Arc<MemoryHeatPump>) {
    let bus = Arc::new(MemoryBus::new());
    let heat_pump = Arc::new(MemoryHeatPump::with_params([
        ("Temp. Vorlauf", DatapointValue::Numeric(35.0)),
        ("Verdichter", DatapointValue::Binary(false)),
    ]));
    let datapoint = Datapoint::from_config("Temp. Vorlauf", &config, bus.clone(), heat_pump.clone());
    (datapoint, bus, heat_pump)
}

/// Collects formatted log output for the current thread.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn encoded(value_type: ValueType, value: impl Into<DatapointValue>) -> Payload {
    value_type.encode(value.into()).unwrap()
}

#[tokio::test]
async fn test_numeric_threshold_measured_from_last_sent_value() {
    let mut cfg = config(ValueType::Temperature);
    cfg.on_change_of = Some(2.0);
    let (mut dp, bus, _) = setup(cfg);

    // First value always goes out
    dp.set(Some(10.0.into())).await.unwrap();
    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Numeric(10.0)));
    assert_eq!(bus.take_sent().len(), 1);

    // Delta 1 < 2: cached only
    dp.set(Some(11.0.into())).await.unwrap();
    assert!(bus.take_sent().is_empty());
    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Numeric(10.0)));
    assert_eq!(dp.value(), Some(DatapointValue::Numeric(11.0)));

    // Delta 2 >= 2: transmitted
    dp.set(Some(12.0.into())).await.unwrap();
    assert_eq!(
        bus.take_sent(),
        vec![Telegram::write(address(), encoded(ValueType::Temperature, 12.0))]
    );
    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Numeric(12.0)));
}

#[tokio::test]
async fn test_threshold_sign_is_ignored() {
    let mut cfg = config(ValueType::Temperature);
    cfg.on_change_of = Some(-2.0);
    let (mut dp, bus, _) = setup(cfg);

    dp.set(Some(10.0.into())).await.unwrap();
    dp.set(Some(8.5.into())).await.unwrap();
    dp.set(Some(7.5.into())).await.unwrap();

    assert_eq!(bus.sent().len(), 2);
    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Numeric(7.5)));
}

#[tokio::test]
async fn test_numeric_without_threshold_sends_every_change() {
    let (mut dp, bus, _) = setup(config(ValueType::Temperature));

    dp.set(Some(20.0.into())).await.unwrap();
    dp.set(Some(20.5.into())).await.unwrap();
    dp.set(Some(20.5.into())).await.unwrap();

    assert_eq!(bus.sent().len(), 2);
}

#[tokio::test]
async fn test_set_none_is_noop() {
    let (mut dp, bus, _) = setup(config(ValueType::Temperature));

    dp.set(None).await.unwrap();

    assert!(dp.payload().is_none());
    assert!(dp.last_sent_value().is_none());
    assert!(bus.sent().is_empty());
}

#[tokio::test]
async fn test_binary_send_on_change() {
    let (mut dp, bus, _) = setup(config(ValueType::Binary));

    dp.set(Some(true.into())).await.unwrap();
    dp.set(Some(true.into())).await.unwrap();
    dp.set(Some(false.into())).await.unwrap();

    assert_eq!(
        bus.sent(),
        vec![
            Telegram::write(address(), Payload::Small(1)),
            Telegram::write(address(), Payload::Small(0)),
        ]
    );
    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Binary(false)));
}

#[tokio::test]
async fn test_binary_without_send_on_change_only_caches() {
    let mut cfg = config(ValueType::Binary);
    cfg.send_on_change = false;
    let (mut dp, bus, _) = setup(cfg);

    dp.set(Some(true.into())).await.unwrap();

    assert!(bus.sent().is_empty());
    assert_eq!(dp.value(), Some(DatapointValue::Binary(true)));
    assert!(dp.last_sent_value().is_none());
}

#[tokio::test]
async fn test_set_rejects_wrong_value_kind() {
    let (mut dp, bus, _) = setup(config(ValueType::Binary));

    let result = dp.set(Some(1.0.into())).await;

    assert!(matches!(result, Err(DeviceError::Value(_))));
    assert!(dp.payload().is_none());
    assert!(bus.sent().is_empty());
}

#[tokio::test]
async fn test_bus_failure_leaves_state_unchanged() {
    let (mut dp, bus, _) = setup(config(ValueType::Temperature));
    dp.set(Some(20.0.into())).await.unwrap();

    bus.set_failing(true);
    let result = dp.set(Some(25.0.into())).await;

    assert!(matches!(result, Err(DeviceError::Bus(_))));
    assert_eq!(dp.value(), Some(DatapointValue::Numeric(20.0)));
    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Numeric(20.0)));
}

#[tokio::test]
async fn test_group_read_answers_with_response() {
    let mut cfg = config(ValueType::Temperature);
    cfg.send_on_change = false;
    let (mut dp, bus, _) = setup(cfg);

    // Nothing cached yet: no answer
    dp.process(&Telegram::read(address())).await.unwrap();
    assert!(bus.take_sent().is_empty());

    dp.set(Some(21.5.into())).await.unwrap();
    dp.process(&Telegram::read(address())).await.unwrap();

    assert_eq!(
        bus.sent(),
        vec![Telegram::response(address(), encoded(ValueType::Temperature, 21.5))]
    );
    // Answering a read is not a spontaneous transmission
    assert!(dp.last_sent_value().is_none());
}

#[tokio::test]
async fn test_cyclic_broadcast() {
    let (mut cyclic, cyclic_bus, _) = setup(DatapointConfig {
        cyclic_sending: true,
        send_on_change: false,
        ..config(ValueType::Temperature)
    });
    let (mut plain, plain_bus, _) = setup(DatapointConfig {
        send_on_change: false,
        ..config(ValueType::Temperature)
    });

    cyclic.set(Some(30.0.into())).await.unwrap();
    plain.set(Some(30.0.into())).await.unwrap();
    cyclic.broadcast_value(false).await.unwrap();
    plain.broadcast_value(false).await.unwrap();

    assert_eq!(
        cyclic_bus.sent(),
        vec![Telegram::write(address(), encoded(ValueType::Temperature, 30.0))]
    );
    assert!(plain_bus.sent().is_empty());
}

#[tokio::test]
async fn test_write_to_read_only_datapoint_is_dropped() {
    let (mut dp, bus, heat_pump) = setup(config(ValueType::Temperature));
    dp.set(Some(35.0.into())).await.unwrap();
    bus.take_sent();

    let write = Telegram::write(address(), encoded(ValueType::Temperature, 50.0));
    dp.process(&write).await.unwrap();

    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Numeric(35.0)));
    assert_eq!(dp.value(), Some(DatapointValue::Numeric(35.0)));
    assert!(heat_pump.set_calls().is_empty());
    assert!(bus.sent().is_empty());
}

#[tokio::test]
async fn test_write_to_read_only_datapoint_logs_warning() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let (mut dp, _, heat_pump) = setup(config(ValueType::Temperature));

    let write = Telegram::write(address(), encoded(ValueType::Temperature, 50.0));
    dp.process(&write).await.unwrap();

    let output = logs.contents();
    assert!(output.contains("WARN"), "no warning in: {}", output);
    assert!(output.contains("non-writable heat pump parameter: 'Temp. Vorlauf'"));
    assert!(heat_pump.set_calls().is_empty());
}

#[tokio::test]
async fn test_malformed_write_to_read_only_datapoint_is_dropped_with_warning() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let (mut dp, _, heat_pump) = setup(config(ValueType::Temperature));

    // one-bit payload cannot be a 2-octet float
    let write = Telegram::write(address(), Payload::Small(1));
    let result = dp.process(&write).await;

    assert!(result.is_ok());
    assert!(logs.contents().contains("non-writable heat pump parameter"));
    assert!(dp.value().is_none());
    assert!(heat_pump.set_calls().is_empty());
}

#[tokio::test]
async fn test_write_is_forwarded_to_heat_pump() {
    let (mut dp, bus, heat_pump) = setup(DatapointConfig {
        writable: true,
        ..config(ValueType::Temperature)
    });

    let write = Telegram::write(address(), encoded(ValueType::Temperature, 40.0));
    dp.process(&write).await.unwrap();

    assert_eq!(
        heat_pump.set_calls(),
        vec![("Temp. Vorlauf".to_string(), DatapointValue::Numeric(40.0))]
    );
    assert_eq!(heat_pump.param("Temp. Vorlauf"), Some(DatapointValue::Numeric(40.0)));
    assert_eq!(dp.value(), Some(DatapointValue::Numeric(40.0)));
    // Not echoed back onto the bus
    assert!(bus.sent().is_empty());
    assert!(dp.last_sent_value().is_none());
}

#[tokio::test]
async fn test_failed_forward_keeps_cached_value() {
    let (mut dp, _, heat_pump) = setup(DatapointConfig {
        writable: true,
        ..config(ValueType::Temperature)
    });
    dp.set(Some(35.0.into())).await.unwrap();
    heat_pump.set_unreachable(true);

    let write = Telegram::write(address(), encoded(ValueType::Temperature, 40.0));
    let result = dp.process(&write).await;

    assert!(matches!(result, Err(DeviceError::HeatPump(_))));
    assert_eq!(dp.value(), Some(DatapointValue::Numeric(35.0)));
}

#[tokio::test]
async fn test_malformed_write_payload() {
    let (mut dp, _, heat_pump) = setup(DatapointConfig {
        writable: true,
        ..config(ValueType::Temperature)
    });

    let write = Telegram::write(address(), Payload::Small(1));
    let result = dp.process(&write).await;

    assert!(matches!(result, Err(DeviceError::Value(_))));
    assert!(heat_pump.set_calls().is_empty());
}

#[tokio::test]
async fn test_refresh_reads_heat_pump() {
    let (mut dp, bus, heat_pump) = setup(config(ValueType::Temperature));

    dp.refresh().await.unwrap();
    assert_eq!(dp.value(), Some(DatapointValue::Numeric(35.0)));

    heat_pump.set_local("Temp. Vorlauf", DatapointValue::Numeric(36.5));
    dp.refresh().await.unwrap();

    assert_eq!(bus.sent().len(), 2);
    assert_eq!(dp.last_sent_value(), Some(DatapointValue::Numeric(36.5)));
}

#[tokio::test]
async fn test_display() {
    let mut cfg = config(ValueType::Temperature);
    cfg.on_change_of = Some(0.5);
    let (mut dp, _, _) = setup(cfg);

    assert_eq!(
        dp.to_string(),
        "<Datapoint name=\"Temp. Vorlauf\" group_address=\"1/2/3\" value_type=\"temperature\" \
         value=\"None\" unit=\"°C\" writable=\"no\" cyclic_sending=\"no\" send_on_change=\"yes\" \
         on_change_of=\"0.5\"/>"
    );

    dp.set(Some(21.5.into())).await.unwrap();
    assert!(dp.to_string().contains("value=\"21.5\""));
    assert_eq!(dp.resolve_state(), "21.5");
    assert_eq!(dp.unit_of_measurement(), Some("°C"));
}

#[test]
fn test_display_keeps_configured_type_name() {
    let (dp, _, _) = setup(config(ValueType::PercentU8));

    assert!(dp.to_string().contains("value_type=\"percentU8\""));
    assert_eq!(dp.unit_of_measurement(), Some("%"));
}
