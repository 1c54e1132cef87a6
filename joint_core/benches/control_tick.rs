use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use joint_core::mocks::{ScriptedSensor, SpyDriver, VecTable};
use joint_core::{Mode, Motor, MotorConfig, build_table, build_motor};

// A raw reading that walks forward with a little jitter, like a turning rotor.
fn rotor_trace(n: usize, seed: u32) -> Vec<u16> {
    let mut state = seed.max(1);
    let mut jitter = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x % 3) as u16
    };
    (0..n)
        .map(|i| ((i as u32 * 3) as u16).wrapping_add(jitter()) & 0x3FFF)
        .collect()
}

fn linear_table() -> VecTable {
    VecTable::from_entries((0..16_384u32).map(|i| (i * 25 / 8) as u16).collect())
}

fn motor_in(mode: Mode, trace: Vec<u16>) -> Motor<ScriptedSensor, SpyDriver, VecTable> {
    let mut m = build_motor(
        ScriptedSensor::sequence(trace),
        SpyDriver::default(),
        linear_table(),
        MotorConfig::default(),
    )
    .unwrap();
    m.set_mode(mode);
    m.set_position_setpoint(25_600);
    m.set_velocity_setpoint(200_000);
    m.set_current_setpoint(500);
    m
}

pub fn bench_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("control_tick");
    // BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p joint_core --bench control_tick
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let ticks = 20_000usize;
    let trace = rotor_trace(ticks, 0xC0FFEE);

    for mode in [Mode::CommandCurrent, Mode::CommandVelocity, Mode::CommandPosition] {
        g.bench_function(format!("{mode}_1s"), |b| {
            b.iter_batched(
                || motor_in(mode, trace.clone()),
                |mut m| {
                    for _ in 0..ticks {
                        m.tick();
                    }
                    black_box(m.state());
                },
                BatchSize::LargeInput,
            )
        });
    }
    g.finish();
}

pub fn bench_table(c: &mut Criterion) {
    let points: Vec<u16> = (0..=200u32).map(|i| ((i * 16_384 / 200 + 3_000) % 16_384) as u16).collect();
    c.bench_function("build_table", |b| {
        b.iter(|| build_table(black_box(&points), black_box(&points)).unwrap());
    });
}

criterion_group!(control, bench_tick, bench_table);
criterion_main!(control);
