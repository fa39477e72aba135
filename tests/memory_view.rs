//! End-to-end MemoryView behaviour against a registered mock backend.

mod common;

use memgate::mem::{MemoryView, ReadData, WriteData};
use memgate::{Address, MemError};

#[test]
fn test_mock_read_write_round_trip() {
    let (registry, _) = common::mock_registry(0x10000);
    let conn = registry.create("mock", "").unwrap();
    let view = conn.physical_view();

    let mut buf = vec![0xccu8; 4096];
    view.read_raw_into(Address::new(0x1000), &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));

    view.write_raw(Address::new(0x1000), &[0xff; 4096]).unwrap();
    view.read_raw_into(Address::new(0x1000), &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0xff));

    let err = view
        .read_raw_into(Address::new(0xffff0), &mut buf)
        .unwrap_err();
    assert!(matches!(err, MemError::OutOfRange { .. }));
}

#[test]
fn test_read_then_write_back_is_idempotent() {
    let (registry, _) = common::mock_registry(0x10000);
    let view = registry.create("mock", "").unwrap().physical_view();
    view.write_raw(Address::new(0x3000), b"pattern-bytes").unwrap();

    let original = view.read_raw(Address::new(0x3000), 13).unwrap();
    view.write_raw(Address::new(0x3000), &original).unwrap();
    assert_eq!(view.read_raw(Address::new(0x3000), 13).unwrap(), original);
}

#[test]
fn test_batch_reports_failing_entry_only() {
    let (registry, _) = common::mock_registry(0x2000);
    let view = registry.create("mock", "").unwrap().physical_view();
    view.write_raw(Address::new(0x1000), &[1, 2, 3, 4]).unwrap();

    let mut first = [0u8; 4];
    let mut second = [0u8; 4];
    let mut data = [
        ReadData::new(0x1000u64, &mut first),
        ReadData::new(0x2000u64, &mut second),
    ];
    let status = view.read_raw_list(&mut data);

    assert!(status.get(0).unwrap().is_ok());
    assert!(matches!(
        status.get(1),
        Some(Err(MemError::OutOfRange { address, .. })) if *address == Address::new(0x2000)
    ));
    assert_eq!(status.failed(), vec![1]);
    assert_eq!(first, [1, 2, 3, 4]);
}

#[test]
fn test_batch_matches_sequential_reads() {
    let (registry, _) = common::mock_registry(0x10000);
    let view = registry.create("mock", "").unwrap().physical_view();
    let pattern: Vec<u8> = (0..0x10000u32).map(|i| (i * 7 % 251) as u8).collect();
    view.write_raw(Address::new(0), &pattern).unwrap();

    let addresses: Vec<u64> = (0..200u64).map(|i| i * 0x140 + (i % 3)).collect();

    let sequential: Vec<Vec<u8>> = addresses
        .iter()
        .map(|&a| view.read_raw(Address::new(a), 24).unwrap().to_vec())
        .collect();

    let mut batch_bufs = vec![vec![0u8; 24]; addresses.len()];
    let mut data: Vec<ReadData<'_>> = addresses
        .iter()
        .zip(batch_bufs.iter_mut())
        .map(|(&a, b)| ReadData::new(a, b.as_mut_slice()))
        .collect();
    assert!(view.read_raw_list(&mut data).is_ok());
    drop(data);

    assert_eq!(batch_bufs, sequential);
}

#[test]
fn test_partial_read_is_not_truncated() {
    let (registry, _) = common::mock_registry(0x1000);
    let view = registry.create("mock", "").unwrap().physical_view();
    let mut buf = [0xeeu8; 0x20];
    let err = view
        .read_raw_into(Address::new(0xff0), &mut buf)
        .unwrap_err();
    assert!(matches!(
        err,
        MemError::PartialRead {
            requested: 0x20,
            available: 0x10,
            ..
        }
    ));
    assert_eq!(buf, [0xee; 0x20], "nothing is copied on a partial read");

    let err = view.write_raw(Address::new(0xff8), &[0; 16]).unwrap_err();
    assert!(matches!(err, MemError::PartialWrite { .. }));
}

#[test]
fn test_write_batch_in_order() {
    let (registry, _) = common::mock_registry(0x1000);
    let view = registry.create("mock", "").unwrap().physical_view();
    let data = [
        WriteData::new(0x10u64, b"aaaa"),
        WriteData::new(0x12u64, b"bb"),
        WriteData::new(0x2000u64, b"x"),
    ];
    let status = view.write_raw_list(&data);
    assert_eq!(status.failed(), vec![2]);
    assert_eq!(view.read_raw(Address::new(0x10), 4).unwrap().as_ref(), b"aabb");
}

#[test]
fn test_typed_helpers() {
    let (registry, _) = common::mock_registry(0x100);
    let view = registry.create("mock", "").unwrap().physical_view();
    view.write_raw(Address::new(0x0), &0x1122_3344_5566_7788u64.to_le_bytes())
        .unwrap();
    view.write_raw(Address::new(0xf8), b"kernel\0x").unwrap();

    assert_eq!(view.read_u32(Address::new(0)).unwrap(), 0x5566_7788);
    assert_eq!(view.read_u64(Address::new(0)).unwrap(), 0x1122_3344_5566_7788);
    assert_eq!(
        view.read_addr64(Address::new(0)).unwrap(),
        Address::new(0x1122_3344_5566_7788)
    );
    // string at the very end of memory is cut at the boundary
    assert_eq!(view.read_cstr(Address::new(0xf8), 64).unwrap(), "kernel");
    assert!(view.read_cstr(Address::new(0x100), 8).is_err());
}

#[test]
fn test_zero_length_requests() {
    let (registry, _) = common::mock_registry(0x100);
    let view = registry.create("mock", "").unwrap().physical_view();
    assert!(view.read_raw_into(Address::new(0x1_0000), &mut []).is_ok());
    assert!(view.write_raw(Address::new(0x1_0000), &[]).is_ok());
    assert!(view.read_raw(Address::new(0x1_0000), 0).unwrap().is_empty());
}
