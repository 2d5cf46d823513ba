use criterion::{criterion_group, criterion_main, Criterion};
use feeder_sync::db::ScheduleWithPet;
use feeder_sync::models::{ScheduleDefinition, Weekdays};
use feeder_sync::services::schedule_sync::compile_entries;
use std::hint::black_box;

const PET_NAMES: [&str; 4] = ["Biscuit", "Mochi", "Rex", "Luna"];

fn rows(count: u64) -> Vec<ScheduleWithPet> {
    (0..count)
        .map(|i| ScheduleWithPet {
            schedule: ScheduleDefinition {
                id: i + 1,
                owner_id: 1,
                pet_id: i % 4,
                device_id: "ESP32_BENCH".to_string(),
                // Scatter times so the sort has real work to do
                hour: ((i * 7) % 24) as u8,
                minute: ((i * 13) % 60) as u8,
                amount_grams: 20 + (i as u32 * 17) % 180,
                weekdays: Weekdays::from_flags([i % 2 == 0, true, true, i % 3 == 0, true, true, false]),
                active: true,
            },
            pet_name: Some(PET_NAMES[(i % 4) as usize].to_string()),
        })
        .collect()
}

fn benchmark_compile_plan(c: &mut Criterion) {
    let typical = rows(8);
    let premium = rows(999);

    let mut group = c.benchmark_group("compile_plan");

    group.bench_function("household_8_schedules", |b| {
        b.iter(|| compile_entries(black_box(&typical)))
    });

    group.bench_function("premium_999_schedules", |b| {
        b.iter(|| compile_entries(black_box(&premium)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_compile_plan);
criterion_main!(benches);
