//! Integration tests for streamed updates
//!
//! A streamed update must produce the same pixels as a single update while
//! only ever buffering one piece (plus filter padding) upstream.

mod common;

use common::builders::{ramp_source, region2, PipelineBuilder};
use common::{assert_float_eq, init_tracing, pixels_in};
use voxflow::pipeline::filters::{MeanFilter, PipelineMonitor, ShrinkFilter, UnaryFunctorFilter};
use voxflow::pipeline::PipelineEvent;
use voxflow::{Region, Size, SplitStrategy};

#[test]
fn test_streamed_mean_equals_single_update() {
    init_tracing();
    let full = region2(30, 24);

    let single = {
        let mut p = PipelineBuilder::new().threads(2).build::<f32, 2>();
        let src = p.add_filter(ramp_source(full));
        let mean = p.add_filter(MeanFilter::new(Size([2, 1])));
        p.connect(src, mean).unwrap();
        p.update(mean).unwrap();
        p.take_output(mean).unwrap()
    };

    for (divisions, strategy) in [
        (4, SplitStrategy::SlowestAxis),
        (5, SplitStrategy::LargestAxis),
        (6, SplitStrategy::Multidimensional),
    ] {
        let mut p = PipelineBuilder::new().threads(2).build::<f32, 2>();
        let src = p.add_filter(ramp_source(full));
        let monitor = p.add_filter(PipelineMonitor::new());
        let mean = p.add_filter(MeanFilter::new(Size([2, 1])));
        p.connect(src, monitor).unwrap();
        p.connect(monitor, mean).unwrap();

        let streamed = p.stream_to_image(mean, divisions, strategy).unwrap();
        assert_eq!(streamed.buffered_region(), full);
        assert_eq!(streamed.as_slice(), single.as_slice(), "{strategy} differs");

        let m = p.filter::<PipelineMonitor<2>>(monitor).unwrap();
        let pieces = strategy.number_of_splits(&full, divisions);
        assert!(m.verify_input_streamed(pieces));
        // Each monitor request is a piece padded by the mean radius, never the whole image.
        assert!(m
            .output_requested_regions()
            .iter()
            .all(|r| full.contains(r) && r.number_of_pixels() < full.number_of_pixels()));
    }
}

#[test]
fn test_stream_sink_sees_each_piece_once() {
    let full = region2(16, 16);
    let mut p = PipelineBuilder::new().threads(3).build::<f32, 2>();
    let src = p.add_filter(ramp_source(full));
    let monitor = p.add_filter(PipelineMonitor::new());
    let negate = p.add_filter(UnaryFunctorFilter::new("negate", |v: f32| -v));
    p.connect(src, monitor).unwrap();
    p.connect(monitor, negate).unwrap();
    let events = p.subscribe();

    let mut progress = Vec::new();
    let mut covered = 0;
    let count = p
        .stream(negate, None, 4, SplitStrategy::SlowestAxis, |piece, image| {
            assert_eq!(image.buffered_region(), piece.region);
            for idx in piece.region.iter() {
                let expected = -common::builders::ramp_value(&idx);
                assert_eq!(image.get(&idx), Some(expected));
            }
            covered += piece.region.number_of_pixels();
            progress.push(piece.progress);
            Ok(())
        })
        .unwrap();

    assert_eq!(count, 4);
    assert_eq!(covered, full.number_of_pixels());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_float_eq(*progress.last().unwrap() as f64, 1.0, 1e-4);

    let m = p.filter::<PipelineMonitor<2>>(monitor).unwrap();
    assert!(m.verify_input_streamed(4));
    assert!(m.verify_output_covers(&full));

    let starts = events
        .try_iter()
        .filter(|e| *e == PipelineEvent::Start { node: negate })
        .count();
    assert_eq!(starts, 4);

    // The terminal requests its whole region again afterwards.
    p.update(negate).unwrap();
    assert_eq!(p.output(negate).unwrap().buffered_region(), full);
}

#[test]
fn test_stream_of_a_sub_region() {
    let full = region2(20, 20);
    let mut p = PipelineBuilder::new().build::<f32, 2>();
    let src = p.add_filter(ramp_source(full));
    let shrink = p.add_filter(ShrinkFilter::<2>::uniform(2));
    p.connect(src, shrink).unwrap();
    p.update(shrink).unwrap();
    let reference = p.output(shrink).unwrap().clone();
    assert_eq!(reference.largest_possible_region(), region2(10, 10));

    let window = Region::new(voxflow::Index([2, 3]), Size([6, 4]));
    let mut gathered = Vec::new();
    p.stream(shrink, Some(window), 2, SplitStrategy::SlowestAxis, |piece, image| {
        gathered.extend(pixels_in(image, &piece.region));
        Ok(())
    })
    .unwrap();
    assert_eq!(gathered, pixels_in(&reference, &window));

    let outside = Region::new(voxflow::Index([8, 8]), Size([4, 4]));
    assert!(p
        .stream(shrink, Some(outside), 2, SplitStrategy::SlowestAxis, |_, _| Ok(()))
        .is_err());
}
