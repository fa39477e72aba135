use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memgate::connectors::builtin_registry;
use memgate::mem::{MemoryView, ReadData};
use memgate::{Address, MemConfig};

fn bench_read_dummy(c: &mut Criterion) {
    let registry = builtin_registry(&MemConfig::default());
    let conn = registry
        .create("dummy", "size=0x1000000")
        .expect("dummy connector");
    let view = conn.physical_view();

    let mut group = c.benchmark_group("read_dummy");
    for entries in [16usize, 256, 4096] {
        let addresses: Vec<u64> = (0..entries as u64).map(|i| (i * 0x1003) % 0xff_f000).collect();
        group.throughput(Throughput::Bytes((entries * 64) as u64));

        group.bench_with_input(BenchmarkId::new("sequential", entries), &addresses, |b, addrs| {
            let mut buf = [0u8; 64];
            b.iter(|| {
                for &a in addrs {
                    view.read_raw_into(Address::new(a), &mut buf).unwrap();
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("batch", entries), &addresses, |b, addrs| {
            let mut bufs = vec![[0u8; 64]; addrs.len()];
            b.iter(|| {
                let mut data: Vec<ReadData<'_>> = addrs
                    .iter()
                    .zip(bufs.iter_mut())
                    .map(|(&a, buf)| ReadData::new(a, &mut buf[..]))
                    .collect();
                assert!(view.read_raw_list(&mut data).is_ok());
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_read_dummy);
criterion_main!(benches);
