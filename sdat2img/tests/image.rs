// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    io::{self, Cursor},
    sync::atomic::AtomicBool,
};

use assert_matches::assert_matches;
use sdat2img::{
    format::{
        rangeset::BlockRange,
        transfer_list::{BLOCK_SIZE, TransferList},
    },
    image::{self, Error, Summary},
};

const BS: usize = BLOCK_SIZE as usize;

/// Build new data from one fill byte per block.
fn blocks(fills: &[u8]) -> Vec<u8> {
    fills.iter().flat_map(|b| [*b; BS]).collect()
}

fn block_of(image: &[u8], index: usize) -> &[u8] {
    &image[index * BS..(index + 1) * BS]
}

fn reconstruct(list: &str, data: &[u8]) -> Result<(Vec<u8>, Summary), Error> {
    let transfer_list: TransferList = list.parse().unwrap();
    let cancel_signal = AtomicBool::new(false);
    let mut sink = Cursor::new(Vec::new());

    let summary = image::reconstruct_image(transfer_list, data, &mut sink, &cancel_signal)?;

    Ok((sink.into_inner(), summary))
}

#[test]
fn source_is_consumed_sequentially() {
    let data = blocks(b"ABCD");
    let (image, summary) = reconstruct("1\n4\nnew 4,0,2,3,4\n", &data).unwrap();

    assert_eq!(image.len(), 4 * BS);
    assert_eq!(block_of(&image, 0), &data[0..BS]);
    assert_eq!(block_of(&image, 1), &data[BS..2 * BS]);
    assert!(block_of(&image, 2).iter().all(|b| *b == 0));
    // Block 3 receives the next unread block, not the block at the same offset.
    assert_eq!(block_of(&image, 3), &data[2 * BS..3 * BS]);

    assert_eq!(
        summary,
        Summary {
            new_blocks: 3,
            bytes_read: 3 * BLOCK_SIZE,
            image_size: 4 * BLOCK_SIZE,
        }
    );
}

#[test]
fn full_coverage_reproduces_source() {
    let data = blocks(b"01234567");
    let (image, summary) = reconstruct("1\n8\nnew 6,0,3,3,5,5,8\n", &data).unwrap();

    assert_eq!(image, data);
    assert_eq!(summary.bytes_read, data.len() as u64);
}

#[test]
fn ranges_follow_command_order() {
    let data = blocks(b"ABCDE");
    let list = "4\n5\n0\n0\nnew 4,4,6,0,2\nerase 2,2,4\nnew 2,7,8\n";
    let (image, _) = reconstruct(list, &data).unwrap();

    assert_eq!(image.len(), 8 * BS);
    assert_eq!(block_of(&image, 0), &[b'C'; BS]);
    assert_eq!(block_of(&image, 1), &[b'D'; BS]);
    assert_eq!(block_of(&image, 2), &[0u8; BS]);
    assert_eq!(block_of(&image, 3), &[0u8; BS]);
    assert_eq!(block_of(&image, 4), &[b'A'; BS]);
    assert_eq!(block_of(&image, 5), &[b'B'; BS]);
    assert_eq!(block_of(&image, 6), &[0u8; BS]);
    assert_eq!(block_of(&image, 7), &[b'E'; BS]);
}

#[test]
fn overlapping_ranges_overwrite() {
    let data = blocks(b"ABC");
    let (image, _) = reconstruct("1\n3\nnew 4,0,2,1,2\n", &data).unwrap();

    assert_eq!(image, blocks(b"AC"));
}

#[test]
fn erase_and_zero_only() {
    // The source must not be read at all.
    let data = blocks(b"AB");
    let (image, summary) = reconstruct("1\n0\nerase 2,0,3\nzero 2,5,6\n", &data).unwrap();

    assert_eq!(image.len(), 6 * BS);
    assert!(image.iter().all(|b| *b == 0));
    assert_eq!(
        summary,
        Summary {
            new_blocks: 0,
            bytes_read: 0,
            image_size: 6 * BLOCK_SIZE,
        }
    );
}

#[test]
fn erase_extends_past_last_write() {
    let data = blocks(b"A");
    let (image, _) = reconstruct("1\n1\nnew 2,0,1\nerase 2,1,10\n", &data).unwrap();

    assert_eq!(image.len(), 10 * BS);
    assert_eq!(block_of(&image, 0), &[b'A'; BS]);
    assert!(image[BS..].iter().all(|b| *b == 0));
}

#[test]
fn sink_is_never_shrunk() {
    let transfer_list: TransferList = "1\n1\nnew 2,0,1\n".parse().unwrap();
    let cancel_signal = AtomicBool::new(false);
    let mut sink = Cursor::new(vec![0xffu8; 3 * BS]);

    image::reconstruct_image(transfer_list, &blocks(b"A")[..], &mut sink, &cancel_signal)
        .unwrap();

    let image = sink.into_inner();
    assert_eq!(image.len(), 3 * BS);
    assert_eq!(block_of(&image, 0), &[b'A'; BS]);
    assert_eq!(block_of(&image, 2), &[0xffu8; BS]);
}

#[test]
fn truncated_source() {
    let data = blocks(b"AB");
    assert_matches!(
        reconstruct("1\n3\nnew 2,0,3\n", &data),
        Err(Error::TruncatedSource {
            range: BlockRange { start: 0, end: 3 },
            expected: 12288,
            actual: 8192,
        })
    );

    // Partial final block.
    let mut data = blocks(b"AB");
    data.extend_from_slice(&[b'C'; 100]);
    assert_matches!(
        reconstruct("1\n3\nnew 2,0,3\n", &data),
        Err(Error::TruncatedSource { actual: 8292, .. })
    );

    // Second range runs out.
    let data = blocks(b"ABC");
    assert_matches!(
        reconstruct("1\n4\nnew 4,0,2,5,7\n", &data),
        Err(Error::TruncatedSource {
            range: BlockRange { start: 5, end: 7 },
            expected: 8192,
            actual: 4096,
        })
    );
}

#[test]
fn no_operations() {
    assert_matches!(reconstruct("1\n0\n", &[]), Err(Error::NoOperations));
    assert_matches!(
        reconstruct("1\n0\nnew 0\nerase 0\n", &[]),
        Err(Error::NoOperations)
    );
}

#[test]
fn offset_overflow() {
    assert_matches!(
        reconstruct("1\n0\nerase 2,0,18446744073709551615\n", &[]),
        Err(Error::OffsetOverflow(18446744073709551615))
    );
}

#[test]
fn cancelled() {
    let transfer_list: TransferList = "1\n1\nnew 2,0,1\n".parse().unwrap();
    let cancel_signal = AtomicBool::new(true);
    let mut sink = Cursor::new(Vec::new());

    let data = blocks(b"A");

    let err = image::reconstruct_image(transfer_list, &data[..], &mut sink, &cancel_signal)
        .unwrap_err();
    assert_matches!(err, Error::DataRead(_, e) if e.kind() == io::ErrorKind::Interrupted);
    assert!(sink.get_ref().is_empty());
}

#[test]
fn file_backed_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let data = blocks(b"ABCDEF");
    let list = "2\n6\n0\n0\nnew 4,10,12,0,4\nzero 2,4,10\n";
    let cancel_signal = AtomicBool::new(false);

    let mut images = vec![];

    for name in ["first.img", "second.img"] {
        let path = dir.path().join(name);
        let transfer_list: TransferList = list.parse().unwrap();
        let mut sink = image::create_sink(&path).unwrap();

        image::reconstruct_image(transfer_list, &data[..], &mut sink, &cancel_signal).unwrap();
        image::persist_sink(sink, &path).unwrap();

        images.push(fs::read(&path).unwrap());
    }

    assert_eq!(images[0].len(), 12 * BS);
    assert_eq!(block_of(&images[0], 10), &[b'A'; BS]);
    assert_eq!(block_of(&images[0], 3), &[b'F'; BS]);
    assert_eq!(images[0], images[1]);
}
