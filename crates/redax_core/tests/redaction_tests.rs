use proptest::prelude::*;
use redax_core::layout::{
    DOS_STUB, DOS_STUB_MESSAGE, MZ_SIGNATURE, NEW_HEADER_POINTER, PE_SIGNATURE, SIZE_OF_CODE,
    SIZE_OF_INITIALIZED_DATA, SIZE_OF_OPTIONAL_HEADER,
};
use redax_core::{
    ByteStore, CoreError, MemoryStore, RedactMode, RedactOptions, ScanReport, scan_and_redact,
};
use std::io;

const OPT_HEADER_SIZE: i16 = 224;
const E_LFANEW: i32 = 0x80;

fn plant_dos_header(data: &mut [u8], at: usize, e_lfanew: i32) {
    data[at..at + 2].copy_from_slice(MZ_SIGNATURE);
    let p = at + NEW_HEADER_POINTER as usize;
    data[p..p + 4].copy_from_slice(&e_lfanew.to_le_bytes());
    let s = at + DOS_STUB as usize;
    data[s..s + DOS_STUB_MESSAGE.len()].copy_from_slice(DOS_STUB_MESSAGE);
}

fn plant_pe(data: &mut [u8], at: usize, code: i32, init: i32) -> std::ops::Range<usize> {
    plant_dos_header(data, at, E_LFANEW);

    let pe = at + E_LFANEW as usize;
    data[pe..pe + 2].copy_from_slice(PE_SIGNATURE);
    let o = pe + SIZE_OF_OPTIONAL_HEADER as usize;
    data[o..o + 2].copy_from_slice(&OPT_HEADER_SIZE.to_le_bytes());
    let c = pe + SIZE_OF_CODE as usize;
    data[c..c + 4].copy_from_slice(&code.to_le_bytes());
    let i = pe + SIZE_OF_INITIALIZED_DATA as usize;
    data[i..i + 4].copy_from_slice(&init.to_le_bytes());

    let start = pe + 24 + OPT_HEADER_SIZE as usize;
    start..start + (code + init) as usize
}

fn options(mode: RedactMode) -> RedactOptions {
    RedactOptions {
        mode,
        ..Default::default()
    }
}

fn diff_offsets(a: &[u8], b: &[u8]) -> Vec<usize> {
    a.iter()
        .zip(b)
        .enumerate()
        .filter(|(_, (x, y))| x != y)
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn test_end_to_end_single_pe() {
    for mode in [RedactMode::Fast, RedactMode::Patterned] {
        let mut data = vec![0u8; 1024];
        let range = plant_pe(&mut data, 512, 64, 32);
        assert_eq!(range, 888..984);
        let original = data.clone();

        let mut store = MemoryStore::new(data);
        let report = scan_and_redact(&mut store, &options(mode)).unwrap();

        assert_eq!(report.pe_files, 1);
        assert_eq!(report.corrupt, 0);
        assert_eq!(report.mz_hits, 1);
        assert_eq!(store.len(), 1024);

        let changed = diff_offsets(&original, store.as_slice());
        assert_eq!(changed.len(), 96, "mode {:?}", mode);
        assert_eq!(changed, range.collect::<Vec<_>>());
    }
}

#[test]
fn test_corrupt_candidate_is_counted_and_untouched() {
    let mut data = vec![0u8; 1024];
    plant_dos_header(&mut data, 0, E_LFANEW);
    data[0x80..0x82].copy_from_slice(b"NE");
    let original = data.clone();

    let mut store = MemoryStore::new(data);
    let report = scan_and_redact(&mut store, &options(RedactMode::Fast)).unwrap();

    assert_eq!(
        report,
        ScanReport {
            mz_hits: 1,
            corrupt: 1,
            ..Default::default()
        }
    );
    assert_eq!(store.as_slice(), original.as_slice());
}

#[test]
fn test_mz_without_stub_is_not_a_match() {
    let mut data = vec![0x41u8; 1024];
    data[300..302].copy_from_slice(MZ_SIGNATURE);
    data[300 + DOS_STUB as usize..300 + DOS_STUB as usize + 10].copy_from_slice(b"This progr");
    let original = data.clone();

    let mut store = MemoryStore::new(data);
    let report = scan_and_redact(&mut store, &options(RedactMode::Fast)).unwrap();

    assert_eq!(
        report,
        ScanReport {
            mz_hits: 1,
            ..Default::default()
        }
    );
    assert_eq!(store.as_slice(), original.as_slice());
}

#[test]
fn test_corrupt_candidate_resumes_after_match() {
    // The failed header pointer targets 0x700; the image at 120 sits before
    // it and is only found because the scan resumes one byte past the match.
    let mut data = vec![0u8; 2048];
    plant_dos_header(&mut data, 0, 0x700);
    let range = plant_pe(&mut data, 120, 40, 0);

    let mut store = MemoryStore::new(data);
    let report = scan_and_redact(&mut store, &options(RedactMode::Fast)).unwrap();

    assert_eq!(report.mz_hits, 2);
    assert_eq!(report.corrupt, 1);
    assert_eq!(report.pe_files, 1);
    assert_eq!(report.redacted, 1);
    assert!(store.as_slice()[range].iter().all(|&b| b == b'?'));
}

#[test]
fn test_several_images() {
    let mut data = vec![0u8; 64 * 1024];
    let ranges: Vec<_> = [0usize, 5000, 20_011, 60_000]
        .iter()
        .map(|&at| plant_pe(&mut data, at, 700, 300))
        .collect();
    let original = data.clone();

    let mut store = MemoryStore::new(data);
    let options = RedactOptions {
        chunk_size: 4096,
        ..options(RedactMode::Patterned)
    };
    let report = scan_and_redact(&mut store, &options).unwrap();

    assert_eq!(report.pe_files, 4);
    assert_eq!(report.redacted, 4);
    assert_eq!(report.bytes_redacted, 4000);

    let expected: Vec<usize> = ranges.into_iter().flatten().collect();
    assert_eq!(diff_offsets(&original, store.as_slice()), expected);
}

struct ReadOnlyStore(MemoryStore);

impl ByteStore for ReadOnlyStore {
    fn len(&self) -> u64 {
        self.0.len()
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> redax_core::Result<usize> {
        self.0.read_at(offset, buffer)
    }

    fn write_at(&mut self, offset: u64, _data: &[u8]) -> redax_core::Result<()> {
        Err(CoreError::Write {
            offset,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        })
    }

    fn flush(&mut self) -> redax_core::Result<()> {
        Ok(())
    }
}

#[test]
fn test_write_failure_aborts_scan() {
    let mut data = vec![0u8; 1024];
    let range = plant_pe(&mut data, 512, 64, 32);
    let mut store = ReadOnlyStore(MemoryStore::new(data));

    let err = scan_and_redact(&mut store, &options(RedactMode::Fast)).unwrap_err();
    assert!(matches!(err, CoreError::Write { offset, .. } if offset == range.start as u64));
}

proptest! {
    #[test]
    fn prop_random_bytes_are_untouched(data in proptest::collection::vec(any::<u8>(), 0..8192)) {
        let original = data.clone();
        let mut store = MemoryStore::new(data);
        let report = scan_and_redact(&mut store, &options(RedactMode::Patterned)).unwrap();

        prop_assert_eq!(report.pe_files, 0);
        prop_assert_eq!(store.as_slice(), original.as_slice());
    }

    #[test]
    fn prop_only_section_data_changes(
        background in proptest::collection::vec(any::<u8>(), 1024..4096),
        at_seed in any::<usize>(),
        code in 1i32..200,
        patterned in any::<bool>(),
        chunk_size in 2usize..512,
    ) {
        let mut data = background;
        let at = at_seed % (data.len() - 600);
        let range = plant_pe(&mut data, at, code, 0);
        let original = data.clone();

        let mode = if patterned { RedactMode::Patterned } else { RedactMode::Fast };
        let options = RedactOptions { mode, chunk_size, ..Default::default() };
        let mut store = MemoryStore::new(data);
        let report = scan_and_redact(&mut store, &options).unwrap();

        prop_assert_eq!(store.len(), original.len() as u64);
        prop_assert_eq!(report.redacted, 1);
        for (i, (after, before)) in store.as_slice().iter().zip(&original).enumerate() {
            if !range.contains(&i) {
                prop_assert_eq!(after, before, "offset {} modified", i);
            }
        }
    }
}
