//! GPU integration tests for the CUDA driver.
//! Run with: cargo test -p devarr-core --features cuda -- --nocapture

#![cfg(feature = "cuda")]

use devarr_core::{Allocator, DevarrError, DeviceError, GpuArray, Ownership, TriangleMode};
use devarr_kernels::cuda::is_cuda_available;

fn cuda() -> Option<Allocator> {
    if !is_cuda_available() {
        eprintln!("no CUDA device, skipping");
        return None;
    }
    Some(Allocator::cuda(0).expect("Failed to open cuda:0"))
}

// ============================================================================
// Transfers
// ============================================================================

#[test]
fn test_cuda_round_trip() {
    let Some(alloc) = cuda() else { return };
    let data: Vec<f32> = (0..1024).map(|i| i as f32 * 0.5).collect();
    let a = GpuArray::<f32, 2>::from_host_in(&alloc, &data, [32, 32]).unwrap();
    assert_eq!(a.to_vec().unwrap(), data);

    let b = a.copy().unwrap();
    assert!(!b.buffer().same_buffer(a.buffer()));
    assert_eq!(b.to_vec().unwrap(), data);
}

#[test]
fn test_cuda_to_emulated_copy() {
    let Some(alloc) = cuda() else { return };
    let a = GpuArray::<u16, 1>::from_host_in(&alloc, &[1, 2, 3], [3]).unwrap();
    let host = GpuArray::<u16, 1>::zeros_in(&Allocator::emulated(), [3]).unwrap();
    host.copy_from(&a).unwrap();
    assert_eq!(host.to_vec().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_cuda_transfer_bounds() {
    let Some(alloc) = cuda() else { return };
    let a = GpuArray::<u8, 1>::new_in(&alloc, [4]).unwrap();
    assert!(matches!(
        a.upload_range(2, &[0; 3]),
        Err(DevarrError::Device(DeviceError::Transfer(_)))
    ));
}

// ============================================================================
// Fills and kernels
// ============================================================================

#[test]
fn test_cuda_fill_widths() {
    let Some(alloc) = cuda() else { return };
    let a = GpuArray::<i8, 1>::filled_in(&alloc, [1000], -5).unwrap();
    assert!(a.to_vec().unwrap().iter().all(|&x| x == -5));
    let b = GpuArray::<u16, 1>::filled_in(&alloc, [1000], 0xBEEF).unwrap();
    assert!(b.to_vec().unwrap().iter().all(|&x| x == 0xBEEF));
    let c = GpuArray::<f32, 1>::filled_in(&alloc, [1000], 1.5).unwrap();
    assert!(c.to_vec().unwrap().iter().all(|&x| x == 1.5));
    let d = GpuArray::<f64, 1>::filled_in(&alloc, [1000], -0.125).unwrap();
    assert!(d.to_vec().unwrap().iter().all(|&x| x == -0.125));
}

#[test]
fn test_cuda_triangular() {
    let Some(alloc) = cuda() else { return };
    let m = GpuArray::<f32, 2>::filled_in(&alloc, [3, 3], 1.0).unwrap();
    m.triangular_zero(0, TriangleMode::LowerExcludingAbove).unwrap();
    assert_eq!(
        m.to_vec().unwrap(),
        vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0]
    );

    let big = GpuArray::<f64, 2>::filled_in(&alloc, [300, 257], 2.0).unwrap();
    big.triu_in_place(3).unwrap();
    let host = big.to_vec().unwrap();
    for r in 0..300usize {
        for c in 0..257usize {
            let expected = if (c as i64) < r as i64 + 3 { 0.0 } else { 2.0 };
            assert_eq!(host[r * 257 + c], expected, "({r}, {c})");
        }
    }
}

#[test]
fn test_cuda_foreign_not_freed() {
    let Some(alloc) = cuda() else { return };
    let owner = GpuArray::<u32, 1>::filled_in(&alloc, [8], 9).unwrap();
    let ptr = owner.device_address(0).unwrap().ptr;
    {
        let view = GpuArray::<u32, 1>::wrap_foreign(&alloc, ptr, [8], Ownership::Borrowed).unwrap();
        assert_eq!(view.to_vec().unwrap(), vec![9; 8]);
    }
    assert_eq!(owner.to_vec().unwrap(), vec![9; 8]);
}
