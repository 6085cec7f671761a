//! End-to-end behavior of a source feeding recording subscribers.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use siggen_core::math::TWO_PI;
use siggen_core::sample::Sample;
use siggen_engine::{
    PortActivity, PrecisionUtcTime, PushSink, Shape, SharedConfig, SignalSource, SourceConfig,
    SourceRunner, StreamDescriptor, TransportError,
};

#[derive(Clone, Debug, PartialEq)]
enum Event<T> {
    Descriptor(StreamDescriptor),
    Packet { data: Vec<T>, eos: bool, stream_id: String, at: Instant },
}

struct Recorder<T> {
    events: Mutex<Vec<Event<T>>>,
}

impl<T> Recorder<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<Event<T>>
    where
        T: Clone,
    {
        self.events.lock().unwrap().clone()
    }

    fn descriptors(&self) -> Vec<StreamDescriptor> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Descriptor(d) => Some(d.clone()),
                Event::Packet { .. } => None,
            })
            .collect()
    }

    fn packets(&self) -> Vec<(Vec<T>, bool, String, Instant)>
    where
        T: Clone,
    {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Packet { data, eos, stream_id, at } => Some((data.clone(), *eos, stream_id.clone(), *at)),
                Event::Descriptor(_) => None,
            })
            .collect()
    }
}

impl<T: Sample> PushSink<T> for Recorder<T> {
    fn push_descriptor(&self, d: &StreamDescriptor) -> Result<(), TransportError> {
        self.events.lock().unwrap().push(Event::Descriptor(d.clone()));
        Ok(())
    }

    fn push_packet(&self, data: &[T], _: &PrecisionUtcTime, eos: bool, stream_id: &str) -> Result<(), TransportError> {
        self.events.lock().unwrap().push(Event::Packet {
            data: data.to_vec(),
            eos,
            stream_id: stream_id.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}

struct Broken;

struct Panicky;

impl PushSink<f64> for Panicky {
    fn push_descriptor(&self, _: &StreamDescriptor) -> Result<(), TransportError> {
        panic!("descriptor rejected by panicking subscriber");
    }

    fn push_packet(&self, _: &[f64], _: &PrecisionUtcTime, _: bool, _: &str) -> Result<(), TransportError> {
        panic!("packet rejected by panicking subscriber");
    }
}

impl PushSink<f64> for Broken {
    fn push_descriptor(&self, _: &StreamDescriptor) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    fn push_packet(&self, _: &[f64], _: &PrecisionUtcTime, _: bool, _: &str) -> Result<(), TransportError> {
        Err(TransportError::Rejected("no route".into()))
    }
}

fn config(update: impl FnOnce(&mut SourceConfig)) -> SharedConfig {
    let mut c = SourceConfig {
        throttle: false,
        transfer_length: 100,
        ..SourceConfig::default()
    };
    update(&mut c);
    SharedConfig::new(c).unwrap()
}

#[test]
fn fan_out_reaches_every_subscriber_until_disconnect() {
    let mut src = SignalSource::new(config(|_| {}));
    let port = src.double_out();
    let a = Recorder::<f64>::new();
    let b = Recorder::<f64>::new();
    port.connect("a", &a).unwrap();
    port.connect("b", &b).unwrap();

    src.tick();
    for r in [&a, &b] {
        let ev = r.events();
        assert_eq!(ev.len(), 2);
        assert!(matches!(ev[0], Event::Descriptor(_)));
        assert!(matches!(ev[1], Event::Packet { eos: false, .. }));
    }
    assert_eq!(a.packets()[0].0, b.packets()[0].0);

    port.disconnect("a");
    src.tick();
    assert_eq!(a.packets().len(), 1);
    assert_eq!(b.packets().len(), 2);
    assert_eq!(b.descriptors().len(), 1);

    port.disconnect("b");
    assert_eq!(port.state(), PortActivity::Idle);
    // ticking with nobody listening is fine
    src.tick();
}

#[test]
fn descriptor_is_pushed_only_when_something_changed() {
    let cfg = config(|_| {});
    let mut src = SignalSource::new(cfg.clone());
    let port = src.double_out();
    let a = Recorder::<f64>::new();
    port.connect("a", &a).unwrap();

    assert!(src.tick().descriptor_pushed);
    assert!(!src.tick().descriptor_pushed);
    assert!(!src.tick().descriptor_pushed);
    assert_eq!(a.descriptors().len(), 1);

    // stream rename: old stream closed, new one announced once
    cfg.update(|c| c.stream_id = "renamed".into()).unwrap();
    assert!(src.tick().descriptor_pushed);
    assert!(!src.tick().descriptor_pushed);
    let ds = a.descriptors();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds[1].stream_id, "renamed");
    let eos: Vec<_> = a.packets().into_iter().filter(|p| p.1).collect();
    assert_eq!(eos.len(), 1);
    assert_eq!(eos[0].2, "SigGen Stream");
    assert!(eos[0].0.is_empty());

    // sample-rate change alters xdelta
    cfg.update(|c| c.sample_rate = 2500.0).unwrap();
    src.tick();
    src.tick();
    let ds = a.descriptors();
    assert_eq!(ds.len(), 3);
    assert!((ds[2].xdelta - 1.0 / 2500.0).abs() < 1e-15);

    // a frequency change does not touch the descriptor
    cfg.update(|c| c.frequency = 10.0).unwrap();
    assert!(!src.tick().descriptor_pushed);

    // a newcomer gets the current descriptor; existing subscribers do not
    let b = Recorder::<f64>::new();
    port.connect("b", &b).unwrap();
    assert!(src.tick().descriptor_pushed);
    assert!(!src.tick().descriptor_pushed);
    assert_eq!(a.descriptors().len(), 3);
    assert_eq!(b.descriptors().len(), 1);
    assert_eq!(b.descriptors()[0].stream_id, "renamed");
    assert!(matches!(b.events()[0], Event::Descriptor(_)));
}

#[test]
fn keyword_change_re_announces() {
    let cfg = config(|_| {});
    let mut src = SignalSource::new(cfg.clone());
    let a = Recorder::<f64>::new();
    src.double_out().connect("a", &a).unwrap();
    src.tick();
    cfg.update(|c| c.chan_rf = 101.5e6).unwrap();
    src.tick();
    src.tick();
    let ds = a.descriptors();
    assert_eq!(ds.len(), 2);
    assert!(ds[1].keywords.contains_key("CHAN_RF"));
}

#[test]
fn resize_keeps_the_waveform_continuous() {
    let cfg = config(|c| {
        c.frequency = 7.3;
        c.sample_rate = 1000.0;
        c.transfer_length = 1000;
    });
    let mut src = SignalSource::new(cfg.clone());
    let a = Recorder::<f64>::new();
    src.double_out().connect("a", &a).unwrap();

    src.tick();
    cfg.update(|c| c.transfer_length = 500).unwrap();
    src.tick();

    let packets = a.packets();
    assert_eq!(packets[0].0.len(), 1000);
    assert_eq!(packets[1].0.len(), 500);
    let dp = 7.3 / 1000.0;
    for (k, v) in packets[1].0.iter().enumerate() {
        let exact = (TWO_PI * dp * (1000 + k) as f64).sin();
        assert!((v - exact).abs() < 1e-8, "k={k} v={v} exact={exact}");
    }
    // the resize re-announced the stream
    assert_eq!(a.descriptors().len(), 2);
}

#[test]
fn failing_subscriber_does_not_starve_the_others() {
    let mut src = SignalSource::new(config(|_| {}));
    let port = src.double_out();
    let broken = Arc::new(Broken);
    let good = Recorder::<f64>::new();
    port.connect("broken", &broken).unwrap();
    port.connect("good", &good).unwrap();
    for _ in 0..3 {
        src.tick();
    }
    assert_eq!(good.packets().len(), 3);
    assert_eq!(port.connections().len(), 2);
}

#[test]
fn short_port_clamps_and_only_runs_when_connected() {
    let cfg = config(|c| {
        c.shape = Shape::Constant;
        c.magnitude = 1000.7;
    });
    let mut src = SignalSource::new(cfg.clone());
    let d = Recorder::<f64>::new();
    src.double_out().connect("d", &d).unwrap();
    src.tick();

    let s = Recorder::<i16>::new();
    src.short_out().connect("s", &s).unwrap();
    src.tick();
    cfg.update(|c| c.magnitude = -1.0e6).unwrap();
    src.tick();

    let shorts = s.packets();
    assert_eq!(shorts.len(), 2);
    assert!(shorts[0].0.iter().all(|&v| v == 1000));
    assert!(shorts[1].0.iter().all(|&v| v == i16::MIN));
    assert_eq!(s.descriptors().len(), 1);
    assert_eq!(d.packets().len(), 3);

    let stats = src.short_out().statistics_snapshot("s").unwrap();
    assert_eq!(stats.stream_ids, vec!["SigGen Stream".to_string()]);
}

#[test]
fn statistics_track_active_streams() {
    let mut src = SignalSource::new(config(|_| {}));
    let port = src.double_out();
    let a = Recorder::<f64>::new();
    port.connect("a", &a).unwrap();
    for _ in 0..5 {
        src.tick();
    }
    let stats = port.statistics_snapshot("a").unwrap();
    assert_eq!(stats.connection_id, "a");
    assert_eq!(stats.stream_ids, vec!["SigGen Stream".to_string()]);
    assert!(stats.elements_per_second >= 0.0);
    assert!(stats.time_since_last_call >= 0.0);
    assert_eq!(port.active_descriptors().len(), 1);

    src.finish();
    let stats = port.statistics_snapshot("a").unwrap();
    assert!(stats.stream_ids.is_empty());
    assert!(port.active_descriptors().is_empty());
}

fn wait_for<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn throttled_runner_paces_and_stops_promptly() {
    let cfg = SharedConfig::new(SourceConfig {
        sample_rate: 1000.0,
        transfer_length: 1000,
        throttle: true,
        ..SourceConfig::default()
    })
    .unwrap();
    let mut runner = SourceRunner::new(SignalSource::new(cfg));
    let a = Recorder::<f64>::new();
    runner.double_out().connect("a", &a).unwrap();

    runner.start().unwrap();
    assert!(runner.is_running());
    assert!(matches!(runner.start(), Err(siggen_engine::SourceError::AlreadyRunning)));

    assert!(wait_for(|| a.packets().len() >= 2, Duration::from_secs(5)));
    let p = a.packets();
    let gap = p[1].3.duration_since(p[0].3).as_secs_f64();
    assert!((gap - 1.0).abs() < 0.25, "gap={gap}");

    // stop lands in the middle of a one-second sleep
    let start = Instant::now();
    runner.stop();
    assert!(start.elapsed() < Duration::from_millis(500));
    assert!(!runner.is_running());

    let last = a.packets().pop().unwrap();
    assert!(last.1, "stop closes the stream");
}

#[test]
fn unthrottled_runner_does_not_sleep() {
    let cfg = config(|c| {
        c.sample_rate = 1000.0;
        c.transfer_length = 1000;
    });
    let mut runner = SourceRunner::new(SignalSource::new(cfg.clone()));
    let a = Recorder::<f64>::new();
    runner.double_out().connect("a", &a).unwrap();
    runner.start().unwrap();
    // each packet covers a full second of signal; real-time pacing would yield one
    assert!(wait_for(|| a.packets().len() >= 20, Duration::from_secs(5)));
    runner.stop();

    // restart continues on the same ports
    runner.start().unwrap();
    let before = a.packets().len();
    assert!(wait_for(|| a.packets().len() > before + 1, Duration::from_secs(5)));
    drop(runner);
}

#[test]
fn panicking_subscriber_does_not_stop_production() {
    let cfg = config(|c| c.transfer_length = 16);
    let mut runner = SourceRunner::new(SignalSource::new(cfg));
    let bad = Arc::new(Panicky);
    let good = Recorder::<f64>::new();
    runner.double_out().connect("a_bad", &bad).unwrap();
    runner.double_out().connect("b_good", &good).unwrap();

    runner.start().unwrap();
    assert!(wait_for(|| good.packets().len() >= 10, Duration::from_secs(5)));
    assert!(runner.is_running());
    assert_eq!(good.descriptors().len(), 1);
    runner.stop();
    assert!(good.packets().pop().unwrap().1);
}

#[test]
fn phase_is_valid_again_once_a_good_config_returns() {
    // valid on its own, but frequency * xdelta overflows to infinity
    let cfg = config(|c| {
        c.sample_rate = 1e-300;
        c.frequency = 1e10;
    });
    let mut src = SignalSource::new(cfg.clone());
    src.tick();
    assert!(src.state().phase_increment().is_infinite());
    let p = src.state().phase();
    assert!((0.0..1.0).contains(&p), "phase={p}");

    cfg.replace(SourceConfig {
        throttle: false,
        transfer_length: 100,
        ..SourceConfig::default()
    })
    .unwrap();
    for _ in 0..5 {
        src.tick();
        let p = src.state().phase();
        assert!((0.0..1.0).contains(&p), "phase={p}");
        assert!(src.state().buffer().iter().all(|v| v.is_finite()));
    }
}
