use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use groovebox_core::engine::adsr::{Adsr, AdsrSettings};
use groovebox_core::engine::filter::{FilterMode, StateVariableFilter};
use groovebox_core::limiter::{soft_clip, Limiter};

fn benchmark_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_variable_filter");
    for mode in [
        FilterMode::LowPass,
        FilterMode::HighPass,
        FilterMode::BandPass,
        FilterMode::Notch,
        FilterMode::Peak,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{mode:?}")), &mode, |b, &mode| {
            let mut filter = StateVariableFilter::new(48_000.0);
            b.iter(|| black_box(filter.process(black_box(0.5), 1200.0, 0.4, mode)));
        });
    }
    group.finish();
}

fn benchmark_adsr(c: &mut Criterion) {
    let mut adsr = Adsr::new(48_000.0);
    adsr.set_settings(AdsrSettings {
        attack_s: 0.01,
        decay_s: 0.1,
        sustain: 0.7,
        release_s: 0.2,
    });
    adsr.note_on();
    c.bench_function("adsr_next_value", |b| {
        b.iter(|| black_box(adsr.next_value()));
    });
}

fn benchmark_limiter(c: &mut Criterion) {
    let mut limiter = Limiter::new(48_000.0);
    c.bench_function("limiter_gain_for", |b| {
        b.iter(|| black_box(limiter.gain_for(black_box(0.9), 0.95, 0.999)));
    });
}

fn benchmark_soft_clip(c: &mut Criterion) {
    c.bench_function("soft_clip", |b| {
        b.iter(|| black_box(soft_clip(black_box(1.8))));
    });
}

criterion_group!(benches, benchmark_filter, benchmark_adsr, benchmark_limiter, benchmark_soft_clip);
criterion_main!(benches);
