//! Throughput of session routing and avatar audio slicing
//!
//! Routing runs once per emitted envelope, slicing once per speech chunk;
//! both sit on the latency path between speech synthesis and the first
//! rendered frame.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbeam::channel::unbounded;
use rand::Rng;
use std::time::Duration;

use avatarchat_core::data::{ChatData, ChatDataType, DataBundle, DataBundleDefinition, DataBundleEntry};
use avatarchat_core::handler::{ConsumeMode, HandlerDataInfo};
use avatarchat_core::session::RoutingTable;

fn audio_envelope(samples: usize) -> ChatData {
    let mut definition =
        DataBundleDefinition::with_entry(DataBundleEntry::audio("tts_audio", 1, 24000)).unwrap();
    let mut bundle = DataBundle::new(&definition.lockdown());
    let mut rng = rand::thread_rng();
    let audio: Vec<f32> = (0..samples).map(|_| rng.gen_range(-1.0..1.0)).collect();
    bundle
        .set_main_data(ndarray::Array2::from_shape_vec((1, samples), audio).unwrap())
        .unwrap();
    let mut data = ChatData::new(ChatDataType::AvatarAudio, bundle);
    data.source = "tts".to_string();
    data
}

/// Fan-out to N DEFAULT subscribers
fn bench_distribute(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    group.measurement_time(Duration::from_secs(5));

    let data = audio_envelope(4800);
    for subscribers in [1usize, 4, 16] {
        let mut routing = RoutingTable::new();
        let mut receivers = Vec::new();
        for i in 0..subscribers {
            let (tx, rx) = unbounded();
            routing.add_sink(
                format!("handler_{}", i),
                HandlerDataInfo::new(ChatDataType::AvatarAudio)
                    .with_priority(i as i32)
                    .with_consume_mode(ConsumeMode::Default),
                tx,
            );
            receivers.push(rx);
        }
        routing.sort();

        group.bench_with_input(
            BenchmarkId::new("distribute", subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    let delivered = routing.distribute(black_box(&data));
                    for rx in &receivers {
                        rx.try_recv().ok();
                    }
                    delivered
                })
            },
        );
    }
    group.finish();
}

#[cfg(feature = "avatar")]
fn bench_slicer(c: &mut Criterion) {
    use avatarchat_core::avatar::{AvatarAlgoConfig, SpeechAudio, SpeechAudioSlicer};

    let mut group = c.benchmark_group("avatar_slicer");
    group.measurement_time(Duration::from_secs(5));

    let mut rng = rand::thread_rng();
    for seconds in [1usize, 5] {
        let samples: Vec<i16> = (0..24000 * seconds).map(|_| rng.gen()).collect();
        group.bench_with_input(BenchmarkId::new("slice_24k", seconds), &samples, |b, samples| {
            b.iter(|| {
                let mut slicer =
                    SpeechAudioSlicer::new(24000, AvatarAlgoConfig::default(), false).unwrap();
                let audio = SpeechAudio::new("bench", 24000, samples.clone()).with_end_of_speech(true);
                black_box(slicer.slice(audio).unwrap())
            })
        });
    }
    group.finish();
}

#[cfg(not(feature = "avatar"))]
fn bench_slicer(_c: &mut Criterion) {}

criterion_group!(benches, bench_distribute, bench_slicer);
criterion_main!(benches);
