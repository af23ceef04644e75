#[cfg(test)]
mod tests {
    use crate::error::WorkloadError;
    use crate::stack::{
        DEEP_ENTRY_FRAME_BYTES, DEEP_FRAME_BYTES, LARGE_FRAME_BYTES, MAX_DEPTH, StackConfig, StackGenerator,
        StackShape,
    };

    fn run(shape: StackShape, depth: usize) -> crate::stack::StackReport {
        StackGenerator::new(StackConfig {
            shape,
            iterations: 10_000,
            depth,
        })
        .run()
        .expect("stack run")
    }

    #[test]
    fn test_shape_parsing() {
        assert_eq!("leaf".parse::<StackShape>().unwrap(), StackShape::Leaf);
        assert_eq!(" Deep ".parse::<StackShape>().unwrap(), StackShape::Deep);
        assert_eq!("large".parse::<StackShape>().unwrap(), StackShape::Large);
        let err = "wide".parse::<StackShape>().expect_err("unknown shape");
        assert!(matches!(err, WorkloadError::Config(_)));
        assert_eq!(StackShape::Deep.to_string(), "deep");
    }

    #[test]
    fn test_every_shape_computes_the_same_result() {
        let leaf = run(StackShape::Leaf, 6);
        let deep = run(StackShape::Deep, 6);
        let large = run(StackShape::Large, 6);

        assert!(leaf.result > 0.0);
        assert_eq!(leaf.result.to_bits(), deep.result.to_bits());
        assert_eq!(leaf.result.to_bits(), large.result.to_bits());
    }

    #[test]
    fn test_frame_bytes_follow_the_shape() {
        assert_eq!(run(StackShape::Leaf, 6).frame_bytes, 0);
        assert_eq!(
            run(StackShape::Deep, 6).frame_bytes,
            DEEP_ENTRY_FRAME_BYTES + 7 * DEEP_FRAME_BYTES
        );
        assert_eq!(run(StackShape::Large, 6).frame_bytes, LARGE_FRAME_BYTES);
    }

    #[test]
    fn test_maximum_depth_fits_its_stack() {
        let report = run(StackShape::Deep, MAX_DEPTH);
        assert_eq!(report.depth, MAX_DEPTH);
        assert!(report.result > 0.0);
    }

    #[test]
    fn test_excessive_depth_is_rejected() {
        let err = StackGenerator::new(StackConfig {
            shape: StackShape::Deep,
            iterations: 1,
            depth: MAX_DEPTH + 1,
        })
        .run()
        .expect_err("too deep");
        assert!(matches!(err.downcast_ref::<WorkloadError>(), Some(WorkloadError::Config(_))));
    }

    #[test]
    fn test_zero_iterations_yield_zero() {
        let report = StackGenerator::new(StackConfig {
            iterations: 0,
            ..StackConfig::default()
        })
        .run()
        .expect("empty run");
        assert_eq!(report.result, 0.0);
    }
}
