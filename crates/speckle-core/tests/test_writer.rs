mod common;

use tempfile::NamedTempFile;

use speckle_core::io::imm::{ImmCursor, IMM_HEADER_SIZE};
use speckle_core::io::imm_writer::ImmWriter;

#[test]
fn test_dense_write_read_roundtrip() {
    let file = NamedTempFile::new().unwrap();
    let frames = vec![vec![0i16, -5, 32767, -32768], vec![1i16, 2, 3, 4]];
    common::write_dense_imm(file.path(), 2, 2, &frames);

    let mut cursor = ImmCursor::open(file.path()).unwrap();
    let mut values = vec![0i16; 4];
    for frame in &frames {
        let header = cursor.read_header().unwrap();
        assert_eq!(header.dlen as usize, frame.len());
        cursor.read_dense_payload(&mut values, 0).unwrap();
        assert_eq!(&values[..], frame.as_slice());
    }
}

#[test]
fn test_sparse_write_read_roundtrip() {
    let file = NamedTempFile::new().unwrap();
    let frames = vec![
        (vec![0u32, 7, 63], vec![-1i16, 100, 7]),
        (vec![31u32], vec![5i16]),
    ];
    common::write_sparse_imm(file.path(), 8, 8, &frames);

    let mut cursor = ImmCursor::open(file.path()).unwrap();
    let mut indices = vec![0u32; 64];
    let mut values = vec![0i16; 64];
    for (idx, val) in &frames {
        let header = cursor.read_header().unwrap();
        let n = header.dlen as usize;
        assert_eq!(n, idx.len());
        cursor
            .read_sparse_payload(n, &mut indices, &mut values, 0)
            .unwrap();
        assert_eq!(&indices[..n], idx.as_slice());
        assert_eq!(&values[..n], val.as_slice());
    }
}

#[test]
fn test_writer_frame_count_and_size() {
    let file = NamedTempFile::new().unwrap();
    let mut writer = ImmWriter::create(file.path(), 2, 2, false).unwrap();
    writer.write_dense_frame(&[1, 2, 3, 4], 0.0, 0).unwrap();
    writer.write_dense_frame(&[5, 6, 7, 8], 0.1, 1).unwrap();
    assert_eq!(writer.frames_written(), 2);
    writer.finalize().unwrap();

    let size = std::fs::metadata(file.path()).unwrap().len();
    assert_eq!(size, 2 * (IMM_HEADER_SIZE as u64 + 4 * 2));
}

#[test]
fn test_sparse_record_width_on_wire() {
    // Sparse records cost 6 bytes each: u32 index + i16 value.
    let file = NamedTempFile::new().unwrap();
    let mut writer = ImmWriter::create(file.path(), 2, 2, true).unwrap();
    writer
        .write_sparse_frame(&[0, 1, 2], &[9, 9, 9], 0.0, 0)
        .unwrap();
    writer.finalize().unwrap();

    let size = std::fs::metadata(file.path()).unwrap().len();
    assert_eq!(size, IMM_HEADER_SIZE as u64 + 3 * 6);
}
