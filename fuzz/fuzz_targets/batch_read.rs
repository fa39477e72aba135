#![no_main]
use libfuzzer_sys::fuzz_target;
use memgate::connectors::dummy::DummyMemory;
use memgate::mem::{MemoryView, ReadData};
use memgate::ConnectorInstance;

// Each 10-byte record is (address: u64 LE, len: u16 LE) against a 64 KiB
// dummy address space.
fuzz_target!(|data: &[u8]| {
    let conn = ConnectorInstance::from_backend("dummy", Box::new(DummyMemory::with_size(0x10000)));
    let view = conn.physical_view();

    let requests: Vec<(u64, usize)> = data
        .chunks_exact(10)
        .take(256)
        .map(|r| {
            let address = u64::from_le_bytes(r[..8].try_into().unwrap());
            let len = u16::from_le_bytes([r[8], r[9]]) as usize;
            (address, len)
        })
        .collect();

    let mut bufs: Vec<Vec<u8>> = requests.iter().map(|&(_, len)| vec![0u8; len]).collect();
    let mut batch: Vec<ReadData<'_>> = requests
        .iter()
        .zip(bufs.iter_mut())
        .map(|(&(a, _), b)| ReadData::new(a, b.as_mut_slice()))
        .collect();
    let status = view.read_raw_list(&mut batch);
    assert_eq!(status.len(), requests.len());

    for (&(address, len), outcome) in requests.iter().zip(status.iter()) {
        let fits = len == 0 || address.checked_add(len as u64).is_some_and(|end| end <= 0x10000);
        assert_eq!(outcome.is_ok(), fits, "address {address:#x} len {len:#x}");
    }
});
