use criterion::{criterion_group, criterion_main, Criterion, black_box};
use feeder_tuner::angle::{self, AngleValue};
use feeder_tuner::protocol::response::{parse_board_dump, parse_firmware_info};
use std::fmt::Write;
use std::time::Duration;

/// An `M621` reply for a full five-board chain.
fn full_chain_dump() -> String {
    let mut raw = String::from("M621\n");
    for board in 0..5 {
        let _ = writeln!(raw, "BoardAddr:{board}");
        for position in 0..13 {
            let _ = writeln!(raw, "M620 N{position} A180 B125 C56 F4 U480 V500 W2500 X1");
        }
        let _ = writeln!(raw, "ok [BoardAddr:{board}]");
    }
    raw
}

pub fn bench_board_dump(c: &mut Criterion) {
    let sample = full_chain_dump();
    c.bench_function("parse_board_dump_5x13", |b| {
        b.iter(|| black_box(parse_board_dump(black_box(&sample))))
    });
}

pub fn bench_firmware_info(c: &mut Criterion) {
    let sample = "FIRMWARE_VERSION:1.4.2 HW_VERSION:slot-v2\n".repeat(5) + "ok\n";
    c.bench_function("parse_firmware_info", |b| {
        b.iter(|| black_box(parse_firmware_info(black_box(&sample))))
    });
}

pub fn bench_angle_instruction(c: &mut Criterion) {
    c.bench_function("apply_relative_angle", |b| {
        b.iter(|| black_box(angle::apply(black_box(AngleValue::ORIGIN), black_box("-15"))))
    });
}

criterion_group!{
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_board_dump, bench_firmware_info, bench_angle_instruction
}
criterion_main!(benches);
