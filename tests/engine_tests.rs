//! Integration tests for the GPU SDFT engine.
//!
//! Every test that needs a device skips when no adapter is available.

use sdft_filter::gpu::binding::{Binding, BindingError, BindingShape, LayoutCache};
use sdft_filter::synth::{generate_sine, generate_tones, generate_white_noise};
use sdft_filter::{
    tone_level_db, ContextOptions, EngineConfig, EngineError, GpuError, ImageKind, Mask,
    ReferenceSdft, SdftEngine,
};

const SAMPLE_RATE: u32 = 16000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(spec_height: u32, segment_width: u32, hop: u32) -> EngineConfig {
    EngineConfig {
        spec_height,
        segment_width,
        hop,
        host_mask_height: spec_height,
        host_mask_width: segment_width,
        sample_rate: SAMPLE_RATE,
        ..Default::default()
    }
}

fn test_options() -> ContextOptions {
    ContextOptions {
        image_width: 256,
        image_height: 256,
        ..Default::default()
    }
}

async fn create_engine(config: EngineConfig) -> Option<SdftEngine> {
    init_logging();
    match SdftEngine::new(config, &test_options()).await {
        Ok(engine) => Some(engine),
        Err(EngineError::DeviceInit(e)) => {
            eprintln!("Skipping: {e}");
            None
        }
        Err(e) => panic!("engine construction failed: {e}"),
    }
}

fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "sample {i}: got {a}, expected {e}"
        );
    }
}

#[tokio::test]
async fn test_invalid_config_rejected_before_device() {
    let result = SdftEngine::new(config(1000, 32, 128), &test_options()).await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

    let result = SdftEngine::new(config(1024, 32, 0), &test_options()).await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

    // H=16, hop=40: windows leave gaps the inverse cannot fill.
    let result = SdftEngine::new(config(16, 3, 40), &test_options()).await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_forward_inverse_round_trip() -> anyhow::Result<()> {
    let Some(mut engine) = create_engine(config(256, 16, 64)).await else {
        return Ok(());
    };
    let signal = generate_white_noise(engine.config().signal_len(), 0.5, 11);

    let spectrum = engine.calc_sdft_raw(&signal)?;
    assert!(spectrum.is_centered());
    let restored = engine.inverse_sdft(&spectrum)?;

    let covered = engine.config().covered_len();
    assert_close(&restored, &signal[..covered], 1e-3);
    engine.destroy();
    Ok(())
}

#[tokio::test]
async fn test_pass_through_mask_is_identity() -> anyhow::Result<()> {
    let config = config(128, 8, 32);
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let signal_in = generate_white_noise(config.input_len(), 1.0, 5);
    let mask = Mask::pass_through(128, 8);

    let out = engine.update(mask.pixels(), &signal_in)?;
    assert_eq!(out.len(), config.signal_len());
    let half = config.spec_height as usize / 2;
    assert_close(&out, &signal_in[half..half + out.len()], 1e-3);
    Ok(())
}

#[tokio::test]
async fn test_zero_mask_silences_output() -> anyhow::Result<()> {
    let config = config(64, 8, 16);
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let signal_in = generate_white_noise(config.input_len(), 1.0, 9);
    let out = engine.update(Mask::zeros(64, 8).pixels(), &signal_in)?;
    assert!(out.iter().all(|y| y.abs() < 1e-6));
    Ok(())
}

#[tokio::test]
async fn test_calc_sdft_is_idempotent() -> anyhow::Result<()> {
    let Some(mut engine) = create_engine(config(512, 16, 128)).await else {
        return Ok(());
    };
    let signal = generate_white_noise(engine.config().signal_len(), 0.8, 21);
    let first = engine.calc_sdft(&signal)?;
    let second = engine.calc_sdft(&signal)?;
    assert_eq!(first.data(), second.data());
    Ok(())
}

#[tokio::test]
async fn test_degenerate_heights() -> anyhow::Result<()> {
    for spec_height in [1, 2, 16] {
        let config = EngineConfig {
            spec_height,
            segment_width: 4,
            hop: 1,
            host_mask_height: 1,
            host_mask_width: 4,
            ..Default::default()
        };
        let Some(mut engine) = create_engine(config.clone()).await else {
            return Ok(());
        };

        let signal = generate_white_noise(config.signal_len(), 1.0, 2);
        let spectrum = engine.calc_sdft_raw(&signal)?;
        let restored = engine.inverse_sdft(&spectrum)?;
        assert_close(&restored, &signal[..config.covered_len()], 1e-4);

        let signal_in = generate_white_noise(config.input_len(), 1.0, 4);
        let out = engine.update(Mask::pass_through(1, 4).pixels(), &signal_in)?;
        let half = spec_height as usize / 2;
        assert_close(&out, &signal_in[half..half + out.len()], 1e-4);
        engine.destroy();
    }
    Ok(())
}

#[tokio::test]
async fn test_sine_lands_on_its_bin() -> anyhow::Result<()> {
    let config = config(1024, 32, 128);
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let signal = generate_sine(1000.0, SAMPLE_RATE, config.signal_len(), 1.0);
    let spectrogram = engine.calc_sdft(&signal)?;

    for t in 0..spectrogram.width() {
        let row = spectrogram.dominant_row(t).expect("window in range");
        let frequency = spectrogram.row_frequency(row, SAMPLE_RATE);
        assert_eq!(frequency.abs(), 1000.0, "window {t} peaked at row {row}");
    }
    assert_eq!(config.bin_for_frequency(1000.0), 64);
    Ok(())
}

#[tokio::test]
async fn test_low_pass_mask_suppresses_high_tone() -> anyhow::Result<()> {
    let config = config(1024, 32, 128);
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let signal_in = generate_tones(&[(200.0, 0.5), (2000.0, 0.5)], SAMPLE_RATE, config.input_len());
    let mask = Mask::band_pass(1024, 32, SAMPLE_RATE, 0.0, 500.0);

    let out = engine.update(mask.pixels(), &signal_in)?;
    let low = tone_level_db(&out, 200.0, SAMPLE_RATE);
    let high = tone_level_db(&out, 2000.0, SAMPLE_RATE);
    assert!(low > -9.0, "200 Hz fell to {low} dB");
    assert!(low - high > 20.0, "200 Hz at {low} dB, 2000 Hz at {high} dB");

    let filtered = engine.filtered_spectrogram()?;
    let high_row = 512 + config.bin_for_frequency(2000.0);
    let low_row = 512 + config.bin_for_frequency(200.0);
    let t = filtered.width() / 2;
    assert!(filtered.get(high_row, t) < 0.01 * filtered.get(low_row, t));
    Ok(())
}

#[tokio::test]
async fn test_gpu_matches_reference() -> anyhow::Result<()> {
    let config = config(64, 8, 16);
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let mut reference = ReferenceSdft::new(&config);

    let signal = generate_white_noise(config.signal_len(), 0.5, 17);
    let gpu = engine.calc_sdft_raw(&signal)?;
    let cpu = reference.forward(&signal);
    for (g, c) in gpu.data().iter().zip(cpu.data()) {
        assert!((g[0] - c[0]).abs() < 1e-3 && (g[1] - c[1]).abs() < 1e-3);
    }

    // A mask that varies over both time and frequency.
    let mask = Mask::from_fn(64, 8, |row, col| ((row + 3 * col) % 7) as f32 / 6.0);
    let signal_in = generate_white_noise(config.input_len(), 0.5, 19);
    let out = engine.update(mask.pixels(), &signal_in)?;
    assert_close(&out, &reference.filter(&mask, &signal_in), 1e-3);
    Ok(())
}

#[tokio::test]
async fn test_mask_is_resampled_to_spectrogram_size() -> anyhow::Result<()> {
    let config = EngineConfig {
        host_mask_height: 5,
        host_mask_width: 3,
        ..config(64, 8, 16)
    };
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let mut reference = ReferenceSdft::new(&config);
    let mask = Mask::from_fn(5, 3, |row, col| (row * 3 + col) as f32 / 14.0);
    let signal_in = generate_white_noise(config.input_len(), 0.5, 23);

    let out = engine.update(mask.pixels(), &signal_in)?;
    assert_close(&out, &reference.filter(&mask, &signal_in), 1e-3);
    Ok(())
}

#[tokio::test]
async fn test_caller_errors_leave_engine_usable() -> anyhow::Result<()> {
    let config = config(64, 8, 16);
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let signal_in = vec![0.0; config.input_len()];

    let err = engine.update(&[0; 3], &signal_in).unwrap_err();
    assert!(matches!(err, EngineError::MaskLength { needed: 512, got: 3 }));

    let mask = Mask::pass_through(64, 8);
    let err = engine.update(mask.pixels(), &signal_in[1..]).unwrap_err();
    assert!(matches!(err, EngineError::SignalLength { .. }));

    let too_long = vec![0.0; config.signal_len() + 1];
    assert!(engine.calc_sdft(&too_long).is_err());

    let spectrum = sdft_filter::ComplexSpectrogram::zeros(32, 8, true);
    assert!(matches!(
        engine.inverse_sdft(&spectrum),
        Err(EngineError::SpectrumShape { .. })
    ));

    assert!(!engine.is_poisoned());
    engine.update(mask.pixels(), &signal_in)?;
    Ok(())
}

#[tokio::test]
async fn test_short_signal_is_zero_padded() -> anyhow::Result<()> {
    let config = config(64, 8, 16);
    let Some(mut engine) = create_engine(config.clone()).await else {
        return Ok(());
    };
    let short = generate_white_noise(100, 0.5, 29);
    let mut padded = short.clone();
    padded.resize(config.signal_len(), 0.0);

    let a = engine.calc_sdft(&short)?;
    let b = engine.calc_sdft(&padded)?;
    assert_eq!(a.data(), b.data());
    Ok(())
}

#[tokio::test]
async fn test_missing_kernel_dir_is_shader_load_error() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig {
        kernel_dir: Some(dir.path().to_path_buf()),
        ..config(64, 8, 16)
    };
    match SdftEngine::new(config, &test_options()).await {
        Err(EngineError::DeviceInit(_)) => {}
        Err(EngineError::ShaderLoad { kernel, .. }) => assert_eq!(kernel, "sdft"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("kernels loaded from an empty directory"),
    }
}

#[tokio::test]
async fn test_unparsable_kernel_is_compile_error() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    for name in ["sdft", "resize", "filter", "sum"] {
        std::fs::write(dir.path().join(format!("{name}.wgsl")), "this is not wgsl").expect("write");
    }
    let config = EngineConfig {
        kernel_dir: Some(dir.path().to_path_buf()),
        ..config(64, 8, 16)
    };
    match SdftEngine::new(config, &test_options()).await {
        Err(EngineError::DeviceInit(_)) => {}
        Err(EngineError::ShaderCompile { kernel, message }) => {
            assert_eq!(kernel, "sdft");
            assert!(!message.is_empty());
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("invalid kernel sources compiled"),
    }
}

#[tokio::test]
async fn test_kernel_dir_with_valid_sources() -> anyhow::Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    for (name, code) in [
        ("sdft", include_str!("../src/gpu/shaders/sdft.wgsl")),
        ("resize", include_str!("../src/gpu/shaders/resize.wgsl")),
        ("filter", include_str!("../src/gpu/shaders/filter.wgsl")),
        ("sum", include_str!("../src/gpu/shaders/sum.wgsl")),
    ] {
        std::fs::write(dir.path().join(format!("{name}.wgsl")), code)?;
    }
    let config = EngineConfig {
        kernel_dir: Some(dir.path().to_path_buf()),
        ..config(64, 8, 16)
    };
    let Some(mut engine) = create_engine(config).await else {
        return Ok(());
    };
    let signal_in = generate_white_noise(engine.config().input_len(), 1.0, 9);
    let out = engine.update(Mask::pass_through(64, 8).pixels(), &signal_in)?;
    assert_close(&out, &signal_in[32..32 + out.len()], 1e-4);
    Ok(())
}

#[tokio::test]
async fn test_spectrogram_image_write() -> anyhow::Result<()> {
    let Some(mut engine) = create_engine(config(64, 8, 16)).await else {
        return Ok(());
    };
    let signal = generate_sine(1000.0, SAMPLE_RATE, engine.config().signal_len(), 1.0);
    let spectrogram = engine.calc_sdft(&signal)?;

    let context = engine.context();
    context.write_spectrogram_image(ImageKind::Raw, &spectrogram, 0, -80.0)?;
    context.write_spectrogram_image(ImageKind::Filtered, &spectrogram, 248, -80.0)?;
    let err = context
        .write_spectrogram_image(ImageKind::Raw, &spectrogram, 250, -80.0)
        .unwrap_err();
    assert!(matches!(err, GpuError::ImageBounds { .. }));

    let image = spectrogram.to_image(-80.0).expect("image");
    assert_eq!(image.dimensions(), (8, 64));
    Ok(())
}

#[tokio::test]
async fn test_image_bind_groups_share_one_layout() {
    let Some(engine) = create_engine(config(64, 8, 16)).await else {
        return;
    };
    let context = engine.context();
    let mut layouts = LayoutCache::new("image_layout", wgpu::ShaderStages::COMPUTE);

    context
        .image_bind_group(ImageKind::Raw, &mut layouts)
        .expect("raw image group");
    context
        .image_bind_group(ImageKind::Filtered, &mut layouts)
        .expect("filtered image group");
    assert_eq!(
        layouts.shape(),
        Some(BindingShape::StorageImage(wgpu::TextureFormat::Rgba8Unorm))
    );

    let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("scratch"),
        size: 64,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });
    let err = layouts
        .group(
            &context.device,
            "scratch",
            &Binding::Buffer {
                buffer: &buffer,
                stride: 8,
                size: 64,
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        BindingError::ShapeMismatch {
            label: "scratch".to_string(),
            expected: BindingShape::StorageImage(wgpu::TextureFormat::Rgba8Unorm),
            found: BindingShape::StorageBuffer,
        }
    );
}

#[tokio::test]
async fn test_spec_width() {
    let config = EngineConfig {
        max_signal_size: 16000,
        ..config(1024, 32, 128)
    };
    // ceil(16000 / 128) + 1 = 126 windows of 1024 bins.
    assert_eq!(config.spectrogram_width(), 1024 * 126);
    if let Some(engine) = create_engine(config).await {
        assert_eq!(engine.spec_width(), 1024 * 126);
    }
}
