//! End-to-end pipeline scenarios against recording fake backends

mod common;

use common::{assert_close, gradient, gradient_png, processor, FakeOutput, RecordingBackend};
use image::{GenericImageView, GrayImage, Luma, Rgb};
use ndarray::Array3;
use roomcraft::{
    AlphaCompositor, CanvasRequest, CanvasSize, ImageIOService, InpaintRequest, OutputNormalizer,
    RawOutput, Region, RegionMask, Result, Strategy, ValueRange,
};

#[tokio::test]
async fn test_erasure_of_one_region_keeps_the_rest_of_the_photo() -> Result<()> {
    let backend = RecordingBackend::new(FakeOutput::Solid([250, 0, 250]));
    let log = backend.log();
    let processor = processor(vec![(Strategy::Erasure, backend)]);
    let input = gradient_png(400, 300);
    let original = ImageIOService::load_from_bytes(&input)?.to_rgb8();

    let regions = Region::parse_list(r#"[{"x":50,"y":50,"width":100,"height":80}]"#)?;
    let (png, result) = processor
        .process_to_png(InpaintRequest::new(Strategy::Erasure, input).with_regions(regions))
        .await?;

    assert_eq!(log.count(), 1);
    assert_eq!(result.canvas, CanvasSize::new(400, 300)?);

    let decoded = ImageIOService::load_from_bytes(&png)?.to_rgb8();
    assert_eq!(decoded.dimensions(), (400, 300));

    // Far from the feathered ramp the photo is untouched
    for (x, y) in [(0, 0), (399, 299), (300, 50), (100, 250)] {
        assert_eq!(decoded.get_pixel(x, y), original.get_pixel(x, y), "pixel ({x}, {y})");
    }
    // The centre of the region is the model output
    assert_close(decoded.get_pixel(100, 90), [250, 0, 250], 2);

    Ok(())
}

#[tokio::test]
async fn test_empty_regions_still_refine_the_whole_image() -> Result<()> {
    let backend = RecordingBackend::new(FakeOutput::Solid([77, 77, 77]));
    let log = backend.log();
    let processor = processor(vec![(Strategy::Refinement, backend)]);

    let regions = Region::parse_list("[]")?;
    let (png, result) = processor
        .process_to_png(
            InpaintRequest::new(Strategy::Refinement, gradient_png(64, 48)).with_regions(regions),
        )
        .await?;

    assert!(result.generated);
    assert_eq!(log.count(), 1);
    let decoded = ImageIOService::load_from_bytes(&png)?;
    assert_eq!(decoded.dimensions(), (64, 48));
    assert_eq!(decoded.to_rgb8().get_pixel(10, 10), &Rgb([77, 77, 77]));
    Ok(())
}

#[tokio::test]
async fn test_refinement_with_regions_returns_the_refined_image_whole() -> Result<()> {
    let backend = RecordingBackend::new(FakeOutput::Solid([77, 77, 77]));
    let log = backend.log();
    let processor = processor(vec![(Strategy::Refinement, backend)]);
    let input = gradient_png(200, 100);
    let original = ImageIOService::load_from_bytes(&input)?.to_rgb8();

    let result = processor
        .process(
            InpaintRequest::new(Strategy::Refinement, input)
                .with_regions(vec![Region::new(10, 10, 20, 20)]),
        )
        .await?;

    assert!(result.generated);
    assert_eq!(log.count(), 1);
    let rgb = result.image.to_rgb8();
    for (x, y) in [(150, 80), (0, 99), (199, 0), (20, 20)] {
        assert_eq!(rgb.get_pixel(x, y), &Rgb([77, 77, 77]), "pixel ({x}, {y})");
    }
    assert_ne!(original.get_pixel(150, 80), &Rgb([77, 77, 77]));
    Ok(())
}

#[tokio::test]
async fn test_requested_canvas_resizes_before_masking() -> Result<()> {
    let processor = processor(vec![(
        Strategy::MaskInpaint,
        RecordingBackend::new(FakeOutput::Solid([0, 200, 0])),
    )]);

    // Region overhangs the canvas and is clipped by the default policy
    let request = InpaintRequest::new(Strategy::MaskInpaint, gradient_png(200, 100))
        .with_canvas(CanvasRequest::exact(320, 240))
        .with_regions(vec![Region::new(280, 200, 100, 100)])
        .with_prompt(Some("a green armchair".to_string()));

    let result = processor.process(request).await?;
    assert_eq!(result.image.dimensions(), (320, 240));
    assert_close(result.image.to_rgb8().get_pixel(319, 239), [0, 200, 0], 2);
    Ok(())
}

#[tokio::test]
async fn test_oversized_model_output_is_fitted_back_to_canvas() -> Result<()> {
    let processor = processor(vec![(
        Strategy::EdgeConditioned,
        RecordingBackend::new(FakeOutput::SolidSized([12, 34, 56], 512, 512)),
    )]);

    let result = processor
        .process(InpaintRequest::new(Strategy::EdgeConditioned, gradient_png(120, 90)))
        .await?;
    assert_eq!(result.image.dimensions(), (120, 90));
    Ok(())
}

#[tokio::test]
async fn test_background_removal_returns_transparency() -> Result<()> {
    let processor = processor(vec![(
        Strategy::BackgroundRemoval,
        RecordingBackend::new(FakeOutput::Cutout),
    )]);

    let (png, _) = processor
        .process_to_png(InpaintRequest::new(Strategy::BackgroundRemoval, gradient_png(40, 20)))
        .await?;
    let rgba = ImageIOService::load_from_bytes(&png)?.to_rgba8();
    assert_eq!(rgba.get_pixel(0, 0)[3], 0);
    assert_eq!(rgba.get_pixel(39, 19)[3], 255);
    Ok(())
}

#[test]
fn test_normalizer_treats_every_result_shape_alike() -> Result<()> {
    let image = gradient(7, 5);
    let rgb = image.to_rgb8();
    let values: Vec<f32> = rgb.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
    let tensor = Array3::from_shape_vec((5, 7, 3), values)
        .unwrap()
        .into_dyn();

    let single = OutputNormalizer::normalize(RawOutput::Single(image.clone()))?;
    let sequence = OutputNormalizer::normalize(RawOutput::Sequence(vec![image.clone()]))?;
    let numeric = OutputNormalizer::normalize(RawOutput::Tensor {
        data: tensor,
        range: ValueRange::Unit,
    })?;

    assert_eq!(single.to_rgb8(), rgb);
    assert_eq!(sequence.to_rgb8(), rgb);
    assert_eq!(numeric.to_rgb8(), rgb);
    Ok(())
}

#[test]
fn test_mask_is_independent_of_region_order() -> Result<()> {
    let canvas = CanvasSize::new(160, 120)?;
    let a = Region::new(10, 10, 30, 20);
    let b = Region::new(90, 60, 40, 40);

    let forward = RegionMask::rasterize(canvas, &[a, b]).feathered(8.0);
    let reverse = RegionMask::rasterize(canvas, &[b, a]).feathered(8.0);
    assert_eq!(forward.as_image().as_raw(), reverse.as_image().as_raw());

    let empty = RegionMask::rasterize(canvas, &[]).feathered(8.0);
    assert_eq!(empty.dimensions(), (160, 120));
    assert!(empty.is_blank());
    Ok(())
}

#[test]
fn test_compositor_extremes() -> Result<()> {
    let base = gradient(16, 16).to_rgb8();
    let overlay = AlphaCompositor::solid(16, 16, [9, 8, 7]);

    let none = GrayImage::from_pixel(16, 16, Luma([0]));
    assert_eq!(AlphaCompositor::composite(&base, &overlay, &none)?, base);

    let full = GrayImage::from_pixel(16, 16, Luma([255]));
    assert_eq!(AlphaCompositor::composite(&base, &overlay, &full)?, overlay);
    Ok(())
}
