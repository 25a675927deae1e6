//! End-to-end tests for the distributed high-pass convolution.

use halosharp::codec;
use halosharp::distributed::comm::{CommunicationBackend, SingleProcessComm};
use halosharp::distributed::comm_local::run_workers;
use halosharp::distributed::partition::{RowPartition, TransferTable};
use halosharp::distributed::{convolve, sharpen_or_keep};
use halosharp::error::HalosharpError;
use halosharp::filter::Kernel;
use halosharp::image::Image;

/// Deterministic pseudo-random pixels (xorshift), so failures reproduce.
fn noise(rows: usize, cols: usize, channels: usize, seed: u32) -> Image {
    let mut state = seed.max(1);
    let data = (0..rows * cols * channels)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect();
    Image::new(rows, cols, channels, data).unwrap()
}

fn checkerboard(n: usize) -> Image {
    let data = (0..n * n)
        .map(|i| if (i / n + i % n) % 2 == 0 { 255 } else { 0 })
        .collect();
    Image::new(n, n, 1, data).unwrap()
}

/// Run `convolve` on `workers` in-process ranks and return the root's image.
fn convolve_on(workers: usize, image: &Image, kernel_size: usize) -> Image {
    let mut outputs = run_workers(workers, |comm| {
        let src = if comm.is_root() {
            image.clone()
        } else {
            Image::empty(image.channels())
        };
        convolve(&src, kernel_size, &comm, None)
    })
    .expect("worker group failed");
    outputs.swap_remove(0)
}

// ── Decomposition invariance ──────────────────────────────────────

#[test]
fn worker_count_does_not_change_output() {
    let image = noise(13, 9, 3, 0x5eed);
    for kernel_size in [3, 5, 7] {
        let single = convolve(&image, kernel_size, &SingleProcessComm, None).unwrap();
        for workers in 1..=6 {
            let multi = convolve_on(workers, &image, kernel_size);
            assert_eq!(
                multi.data(),
                single.data(),
                "k={kernel_size} workers={workers} differs from single process"
            );
        }
    }
}

#[test]
fn more_workers_than_rows() {
    let image = noise(3, 10, 3, 77);
    let single = convolve(&image, 3, &SingleProcessComm, None).unwrap();
    let multi = convolve_on(8, &image, 3);
    assert_eq!(multi, single);
}

#[test]
fn kernel_wider_than_image() {
    let image = noise(2, 3, 3, 9);
    let single = convolve(&image, 9, &SingleProcessComm, None).unwrap();
    assert_eq!(convolve_on(2, &image, 9), single);
}

#[test]
fn empty_image_round_trips() {
    let image = Image::new(0, 0, 3, Vec::new()).unwrap();
    let out = convolve_on(3, &image, 3);
    assert_eq!(out.rows(), 0);
    assert!(out.is_empty());
}

// ── Filter response ───────────────────────────────────────────────

#[test]
fn flat_image_maps_to_zero_residual() {
    // The kernel sums to zero and is applied directly, so a constant
    // region carries no high-frequency content.
    let image = Image::new(5, 5, 1, vec![100; 25]).unwrap();
    let out = convolve(&image, 3, &SingleProcessComm, None).unwrap();
    assert!(out.data().iter().all(|&v| v == 0));
}

#[test]
fn checkerboard_saturates_at_every_transition() {
    let image = checkerboard(8);
    for workers in [1, 3] {
        let out = convolve_on(workers, &image, 3);
        assert!(out.data().iter().all(|&v| v == 0 || v == 255));
        // Bright squares see four dark neighbours (or replicated bright
        // ones at the border) and saturate high; dark squares go to 0.
        assert_eq!(out, image);
    }
}

#[test]
fn single_edge_is_amplified() {
    // Left half 60, right half 180: the columns either side of the step
    // saturate, everything else is flat and maps to 0.
    let cols = 6;
    let data: Vec<u8> = (0..4 * cols)
        .map(|i| if i % cols < 3 { 60 } else { 180 })
        .collect();
    let image = Image::new(4, cols, 1, data).unwrap();
    let out = convolve_on(2, &image, 3);
    for row in 0..4 {
        assert_eq!(out.get(row, 0, 0), 0);
        assert_eq!(out.get(row, 1, 0), 0);
        assert_eq!(out.get(row, 2, 0), 0); // 60 - 180 < 0
        assert_eq!(out.get(row, 3, 0), 120); // 180 - 60
        assert_eq!(out.get(row, 4, 0), 0);
        assert_eq!(out.get(row, 5, 0), 0);
    }
}

#[test]
fn rgb_channels_are_filtered_independently() {
    let mut image = Image::zeros(5, 5, 3).unwrap();
    image.set(2, 2, 0, 10);
    image.set(2, 2, 1, 20);
    image.set(2, 2, 2, 30);
    let out = convolve_on(2, &image, 3);
    assert_eq!(out.get(2, 2, 0), 40);
    assert_eq!(out.get(2, 2, 1), 80);
    assert_eq!(out.get(2, 2, 2), 120);
    assert_eq!(out.get(1, 2, 0), 0);
}

// ── Kernel size handling ──────────────────────────────────────────

#[test]
fn kernel_sums_to_zero_for_odd_sizes() {
    for size in (3..=41).step_by(2) {
        assert_eq!(Kernel::high_pass(size).unwrap().sum(), 0);
    }
}

#[test]
fn invalid_kernel_size_keeps_image_on_every_rank() {
    let image = noise(6, 6, 3, 3);
    let outputs = run_workers(3, |comm| {
        let src = if comm.is_root() { image.clone() } else { Image::empty(3) };
        sharpen_or_keep(&src, 4, &comm, None)
    })
    .unwrap();
    assert_eq!(outputs[0], image);

    let err = convolve(&image, 1, &SingleProcessComm, None).unwrap_err();
    assert!(matches!(err, HalosharpError::InvalidKernelSize { size: 1 }));
}

// ── Partitioning ──────────────────────────────────────────────────

#[test]
fn transfer_table_for_ten_rows_three_workers() {
    let cols = 8;
    let channels = 3;
    let ranges: Vec<_> = RowPartition::all(10, 3)
        .unwrap()
        .iter()
        .map(|p| p.rows())
        .collect();
    assert_eq!(ranges, vec![0..4, 4..7, 7..10]);

    let table = TransferTable::build(10, cols * channels, 3).unwrap();
    let row = cols * channels;
    assert_eq!(table.counts, vec![4 * row, 3 * row, 3 * row]);
    assert_eq!(table.displs, vec![0, table.counts[0], table.counts[0] + table.counts[1]]);
}

// ── Codec end to end ──────────────────────────────────────────────

#[test]
fn decode_sharpen_encode() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.png");
    let output = dir.path().join("output.png");

    let image = noise(12, 10, 3, 1234);
    codec::save_image(&image, &input).unwrap();

    let decoded = codec::load_image(&input).unwrap();
    let sharpened = convolve_on(3, &decoded, 5);
    codec::save_image(&sharpened, &output).unwrap();

    let expected = convolve(&image, 5, &SingleProcessComm, None).unwrap();
    assert_eq!(codec::load_image(&output).unwrap(), expected);
}
