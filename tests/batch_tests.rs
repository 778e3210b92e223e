use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use ui_align::batch::{align_batch, load_manifest, AlignJob, BatchReport};
use ui_align::{AlignmentError, Aligner, Offset};

fn noise(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

fn write(dir: &Path, name: &str, image: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

#[test]
fn test_batch_keeps_order_and_isolates_failures() {
    let dir = tempdir().unwrap();
    let full = noise(120, 100, 42);
    let reference = write(dir.path(), "reference.png", &full);

    let mut jobs = Vec::new();
    for (i, (x, y)) in [(0u32, 0u32), (10, 5), (25, 30)].iter().enumerate() {
        let part = image::imageops::crop_imm(&full, *x, *y, 60, 50).to_image();
        let target = write(dir.path(), &format!("target{i}.png"), &part);
        jobs.push(AlignJob::new(&reference, target, dir.path().join(format!("out{i}.png"))));
    }
    jobs.insert(
        1,
        AlignJob::new(
            &reference,
            dir.path().join("missing.png"),
            dir.path().join("out-missing.png"),
        ),
    );

    let aligner = Aligner::new();
    let entries = align_batch(&aligner, jobs.clone(), 2).unwrap();

    assert_eq!(entries.len(), 4);
    for (entry, job) in entries.iter().zip(&jobs) {
        assert_eq!(&entry.job, job);
    }
    assert!(matches!(entries[1].result, Err(AlignmentError::Decode { .. })));
    let offsets: Vec<Offset> = [0, 2, 3]
        .iter()
        .map(|&i| entries[i].result.as_ref().unwrap().offset)
        .collect();
    assert_eq!(offsets, vec![Offset::new(0, 0), Offset::new(10, 5), Offset::new(25, 30)]);

    // Every call gets its own id, even when run concurrently.
    let mut ids: Vec<_> = [0, 2, 3]
        .iter()
        .map(|&i| entries[i].result.as_ref().unwrap().alignment_id)
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);

    let report = BatchReport::from_entries(&entries, 0.0);
    assert_eq!((report.total, report.succeeded, report.failed), (4, 3, 1));
    let json = serde_json::to_value(&report).unwrap();
    assert!(json["entries"][1]["error"].as_str().unwrap().contains("missing.png"));
    assert!(json["entries"][0].get("error").is_none());
}

#[test]
fn test_manifest_round_trips_through_batch() {
    let dir = tempdir().unwrap();
    let image = noise(40, 40, 1);
    let reference = write(dir.path(), "a.png", &image);
    let target = write(dir.path(), "b.png", &image);
    let manifest = dir.path().join("jobs.json");
    let jobs = vec![AlignJob::new(&reference, &target, dir.path().join("c.png"))];
    std::fs::write(&manifest, serde_json::to_string(&jobs).unwrap()).unwrap();

    let loaded = load_manifest(&manifest).unwrap();
    assert_eq!(loaded, jobs);

    let entries = align_batch(&Aligner::new(), loaded, 0).unwrap();
    assert!(entries[0].result.is_ok());
    assert!(dir.path().join("c.png").exists());
}
