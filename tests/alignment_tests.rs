use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;
use ui_align::algorithms::multi_scale;
use ui_align::config::MultiScaleConfig;
use ui_align::pipeline::{AttemptOutcome, RecordingObserver};
use ui_align::{
    align_images, AlignMethod, AlignOptions, Aligner, AlignmentError, Config, ImageEngine,
    OpenCvEngine, Offset, Region, StrategyId,
};

fn textured(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    // Blocky noise so downsampled copies keep some structure.
    let blocks_x = width / 4 + 1;
    let blocks_y = height / 4 + 1;
    let palette: Vec<[u8; 3]> = (0..blocks_x * blocks_y)
        .map(|_| [rng.gen(), rng.gen(), rng.gen()])
        .collect();
    RgbImage::from_fn(width, height, |x, y| {
        Rgb(palette[((y / 4) * blocks_x + x / 4) as usize])
    })
}

fn crop(image: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    image::imageops::crop_imm(image, x, y, width, height).to_image()
}

fn save(dir: &Path, name: &str, image: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

fn hidden_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect()
}

#[test]
fn test_identical_images_align_at_origin() {
    let dir = tempdir().unwrap();
    let image = textured(120, 90, 7);
    let reference = save(dir.path(), "reference.png", &image);
    let target = save(dir.path(), "target.png", &image);
    let output = dir.path().join("aligned.png");

    let outcome = align_images(&reference, &target, &output, &AlignOptions::default()).unwrap();

    assert_eq!(outcome.offset, Offset::ZERO);
    assert_eq!(outcome.method, StrategyId::TargetInReference);
    let score = outcome.score.unwrap();
    assert!(score < 300.0, "identical images should score near zero, got {}", score);
    assert_eq!(outcome.matching_region, Region::new(0, 0, 120, 90));
    assert!(output.exists());
}

#[test]
fn test_subregion_offset_is_recovered_exactly() {
    let dir = tempdir().unwrap();
    let full = textured(200, 160, 11);
    let part = crop(&full, 37, 21, 120, 90);
    let reference = save(dir.path(), "reference.png", &full);
    let target = save(dir.path(), "target.png", &part);
    let output = dir.path().join("aligned.png");

    let outcome = align_images(&reference, &target, &output, &AlignOptions::default()).unwrap();

    assert_eq!(outcome.offset, Offset::new(37, 21));
    assert_eq!(outcome.method, StrategyId::TargetInReference);
    assert_eq!(outcome.matching_region, Region::new(37, 21, 120, 90));

    let aligned = image::open(&output).unwrap().to_rgba8();
    assert_eq!(aligned.dimensions(), (200, 160));
    assert_eq!(aligned.get_pixel(0, 0)[3], 0, "outside the target is transparent");
    let placed = aligned.get_pixel(37 + 5, 21 + 5);
    let source = part.get_pixel(5, 5);
    assert_eq!(placed[3], 255);
    assert_eq!(&placed.0[..3], &source.0[..]);
}

#[test]
fn test_swapping_inputs_negates_the_offset() {
    let dir = tempdir().unwrap();
    let full = textured(200, 160, 23);
    let part = crop(&full, 40, 30, 110, 100);
    let large = save(dir.path(), "large.png", &full);
    let small = save(dir.path(), "small.png", &part);

    let forward = align_images(
        &large,
        &small,
        &dir.path().join("forward.png"),
        &AlignOptions::default(),
    )
    .unwrap();
    let backward = align_images(
        &small,
        &large,
        &dir.path().join("backward.png"),
        &AlignOptions::default(),
    )
    .unwrap();

    assert_eq!(forward.offset, Offset::new(40, 30));
    assert_eq!(backward.method, StrategyId::ReferenceInTarget);
    assert_eq!(backward.offset, forward.offset.inverted());
    // The reference is fully covered when the larger target is moved onto it.
    assert_eq!(backward.matching_region, Region::new(0, 0, 110, 100));
    let aligned = image::open(dir.path().join("backward.png")).unwrap();
    assert_eq!((aligned.width(), aligned.height()), (110, 100));
}

#[test]
fn test_red_square_shift_stays_in_subimage_search() {
    let dir = tempdir().unwrap();
    let mut canvas = RgbImage::from_pixel(800, 600, Rgb([255, 255, 255]));
    for y in 50..150 {
        for x in 50..150 {
            canvas.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    // Square sits at (30, 40) in the target.
    let shifted = crop(&canvas, 20, 10, 760, 580);
    let reference = save(dir.path(), "reference.png", &canvas);
    let target = save(dir.path(), "target.png", &shifted);

    let recorder = Arc::new(RecordingObserver::new());
    let aligner = Aligner::new().with_observer(recorder.clone());
    let outcome = aligner
        .align(
            &reference,
            &target,
            &dir.path().join("aligned.png"),
            &AlignOptions::default(),
        )
        .unwrap();

    assert_eq!(outcome.offset, Offset::new(20, 10));
    assert!(outcome.score.unwrap() < 1000.0);
    assert_eq!(recorder.executed(), vec![StrategyId::TargetInReference]);
    assert_eq!(outcome.executed_strategies(), recorder.executed());
}

#[test]
fn test_grid_search_finds_a_same_size_shift() {
    let dir = tempdir().unwrap();
    let wide = textured(350, 200, 31);
    // The target shows the reference scrolled 50px to the right.
    let reference = save(dir.path(), "reference.png", &crop(&wide, 0, 0, 300, 200));
    let target = save(dir.path(), "target.png", &crop(&wide, 50, 0, 300, 200));

    let engine = OpenCvEngine::new();
    let reference = engine.load(&reference).unwrap();
    let target = engine.load(&target).unwrap();
    let found = multi_scale(&engine, &MultiScaleConfig::default(), &reference, &target).unwrap();

    assert_eq!(found.method, StrategyId::MultiScale);
    assert_eq!(found.offset, Offset::new(50, 0));

    let swapped = multi_scale(&engine, &MultiScaleConfig::default(), &target, &reference).unwrap();
    assert_eq!(swapped.offset, Offset::new(-50, 0));
}

#[test]
fn test_matching_region_never_exceeds_either_image() {
    let dir = tempdir().unwrap();
    let pairs = [((160, 120), (90, 140)), ((100, 80), (100, 80)), ((64, 200), (180, 50))];

    for (i, ((rw, rh), (tw, th))) in pairs.iter().enumerate() {
        let reference = save(dir.path(), &format!("r{i}.png"), &textured(*rw, *rh, i as u64));
        let target = save(dir.path(), &format!("t{i}.png"), &textured(*tw, *th, 100 + i as u64));
        let outcome = align_images(
            &reference,
            &target,
            &dir.path().join(format!("o{i}.png")),
            &AlignOptions::default(),
        )
        .unwrap();

        let region = outcome.matching_region;
        assert!(region.width <= (*rw).min(*tw), "pair {i}: {:?}", region);
        assert!(region.height <= (*rh).min(*th), "pair {i}: {:?}", region);
        assert!(region.x >= 0 && region.y >= 0);
    }
}

#[test]
fn test_no_scratch_files_left_after_success() {
    let dir = tempdir().unwrap();
    let reference = save(dir.path(), "reference.png", &textured(150, 100, 3));
    let target = save(dir.path(), "target.png", &textured(130, 120, 4));

    let outcome = align_images(
        &reference,
        &target,
        &dir.path().join("aligned.png"),
        &AlignOptions::default(),
    )
    .unwrap();

    // Unrelated textures with mismatched sizes walk most of the cascade.
    assert!(outcome.executed_strategies().len() > 2);
    assert!(hidden_files(dir.path()).is_empty());
}

#[test]
fn test_unwritable_output_is_a_composite_error_without_leftovers() {
    let dir = tempdir().unwrap();
    let image = textured(80, 60, 5);
    let reference = save(dir.path(), "reference.png", &image);
    let target = save(dir.path(), "target.png", &image);

    // A non-empty directory cannot be replaced by the rendered file.
    let output = dir.path().join("aligned.png");
    std::fs::create_dir(&output).unwrap();
    std::fs::write(output.join("keep.txt"), "x").unwrap();

    let err = align_images(&reference, &target, &output, &AlignOptions::default()).unwrap_err();

    assert!(matches!(err, AlignmentError::Composite { .. }), "{err}");
    assert!(hidden_files(dir.path()).is_empty());
    assert!(output.join("keep.txt").exists());
}

#[test]
fn test_undecodable_input_is_a_decode_error() {
    let dir = tempdir().unwrap();
    let reference = save(dir.path(), "reference.png", &textured(50, 50, 1));
    let bogus = dir.path().join("target.png");
    std::fs::write(&bogus, b"not an image").unwrap();

    let err = align_images(
        &reference,
        &bogus,
        &dir.path().join("aligned.png"),
        &AlignOptions::default(),
    )
    .unwrap_err();

    match err {
        AlignmentError::Decode { path, .. } => assert_eq!(path, bogus),
        other => panic!("expected decode error, got {other}"),
    }
    assert!(!dir.path().join("aligned.png").exists());
}

#[test]
fn test_opencv_method_on_featureless_images_falls_back() {
    let dir = tempdir().unwrap();
    let blank = RgbImage::from_pixel(160, 120, Rgb([240, 240, 240]));
    let reference = save(dir.path(), "reference.png", &blank);
    let target = save(dir.path(), "target.png", &blank);

    let options = AlignOptions::default().with_method(AlignMethod::Opencv);
    let outcome = align_images(&reference, &target, &dir.path().join("aligned.png"), &options)
        .unwrap();

    let feature = outcome
        .attempts
        .iter()
        .find(|a| a.strategy == StrategyId::FeatureHomography)
        .unwrap();
    assert!(matches!(feature.outcome, AttemptOutcome::Failed { .. }));
    assert!(outcome.transform.is_none());
    assert_eq!(outcome.offset, Offset::ZERO);
}

#[test]
fn test_outcome_serializes_camel_case() {
    let dir = tempdir().unwrap();
    let image = textured(64, 48, 9);
    let reference = save(dir.path(), "reference.png", &image);
    let target = save(dir.path(), "target.png", &image);

    let aligner = Aligner::from_config(Config::default()).unwrap();
    let outcome = aligner
        .align(
            &reference,
            &target,
            &dir.path().join("aligned.png"),
            &AlignOptions::default(),
        )
        .unwrap();
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["method"], "target-in-ref");
    assert_eq!(json["offset"]["x"], 0);
    assert_eq!(json["matchingRegion"]["width"], 64);
    assert!(json["alignedPath"].as_str().unwrap().ends_with("aligned.png"));
    assert_eq!(json["attempts"][1]["status"], "candidate");
}
