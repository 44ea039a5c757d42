use shared::errors::FrameSpecError;

/// Upper bound on the number of frames a single camera's specification may expand to.
pub const MAX_FRAMES_PER_SPEC: usize = 1_000_000;

/// Expands a comma-separated frame specification into frame numbers.
///
/// Each token is either a single frame (`25`) or an inclusive range (`25-40`).
/// Frames are returned in the order they are written: no sorting and no de-duplication
/// across tokens. An empty specification yields no frames.
///
/// A range whose start is after its end is rejected instead of being reversed or treated as empty.
/// Specifications expanding to more than [`MAX_FRAMES_PER_SPEC`] frames are rejected before
/// anything is allocated for the offending range.
pub fn expand_frame_spec(spec: &str) -> Result<Vec<i64>, FrameSpecError> {
    if spec.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut frames = Vec::new();

    for token in spec.split(',') {
        if token.contains('-') {
            let (start, end) = parse_frame_range(token)?;

            let range_length = (i128::from(end) - i128::from(start) + 1) as u128;
            if frames.len() as u128 + range_length > MAX_FRAMES_PER_SPEC as u128 {
                return Err(too_many_frames(token));
            }

            frames.extend(start..=end);
        } else {
            let frame = parse_single_frame(token)?;

            if frames.len() >= MAX_FRAMES_PER_SPEC {
                return Err(too_many_frames(token));
            }

            frames.push(frame);
        }
    }

    Ok(frames)
}

fn too_many_frames(token: &str) -> FrameSpecError {
    FrameSpecError::TooManyFrames {
        token: token.trim().to_string(),
        max: MAX_FRAMES_PER_SPEC,
    }
}

fn parse_single_frame(token: &str) -> Result<i64, FrameSpecError> {
    let token = token.trim();

    token.parse::<i64>().map_err(|_| FrameSpecError::InvalidFrame {
        token: token.to_string(),
    })
}

fn parse_frame_range(token: &str) -> Result<(i64, i64), FrameSpecError> {
    let token = token.trim();
    let malformed = || FrameSpecError::MalformedRange {
        token: token.to_string(),
    };

    let mut bounds = token.split('-');
    let (Some(start), Some(end), None) = (bounds.next(), bounds.next(), bounds.next()) else {
        return Err(malformed());
    };

    let start = start.trim().parse::<i64>().map_err(|_| malformed())?;
    let end = end.trim().parse::<i64>().map_err(|_| malformed())?;

    if start > end {
        return Err(FrameSpecError::DescendingRange {
            token: token.to_string(),
            start,
            end,
        });
    }

    Ok((start, end))
}


#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn expands_single_frames_in_written_order() {
        assert_eq!(expand_frame_spec("11,25,250").unwrap(), vec![11, 25, 250]);
        assert_eq!(expand_frame_spec("250,11,11").unwrap(), vec![250, 11, 11]);
    }

    #[test]
    fn expands_inclusive_ranges() {
        assert_eq!(expand_frame_spec("25-28").unwrap(), vec![25, 26, 27, 28]);
        assert_eq!(expand_frame_spec("7-7").unwrap(), vec![7]);
        assert_eq!(expand_frame_spec("5-6,1,3-4").unwrap(), vec![5, 6, 1, 3, 4]);
    }

    #[test]
    fn tolerates_whitespace_around_tokens() {
        assert_eq!(expand_frame_spec(" 1, 2 ,10 - 12").unwrap(), vec![1, 2, 10, 11, 12]);
    }

    #[test]
    fn empty_spec_has_no_frames() {
        assert_eq!(expand_frame_spec("").unwrap(), Vec::<i64>::new());
        assert_eq!(expand_frame_spec("   ").unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn descending_range_is_rejected() {
        assert_eq!(
            expand_frame_spec("3-1"),
            Err(FrameSpecError::DescendingRange {
                token: "3-1".to_string(),
                start: 3,
                end: 1,
            })
        );
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(
            expand_frame_spec("1,abc"),
            Err(FrameSpecError::InvalidFrame {
                token: "abc".to_string()
            })
        );
        assert_eq!(
            expand_frame_spec("1,,2"),
            Err(FrameSpecError::InvalidFrame {
                token: "".to_string()
            })
        );

        for token in ["1-2-3", "-5", "4-", "a-b"] {
            assert_eq!(
                expand_frame_spec(token),
                Err(FrameSpecError::MalformedRange {
                    token: token.to_string()
                }),
                "token {token:?} should be a malformed range"
            );
        }
    }

    #[test]
    fn oversized_ranges_are_rejected_without_expanding() {
        assert_eq!(
            expand_frame_spec("1-2000000000"),
            Err(FrameSpecError::TooManyFrames {
                token: "1-2000000000".to_string(),
                max: MAX_FRAMES_PER_SPEC,
            })
        );
        assert_eq!(
            expand_frame_spec(&format!("0-{}", i64::MAX)),
            Err(FrameSpecError::TooManyFrames {
                token: format!("0-{}", i64::MAX),
                max: MAX_FRAMES_PER_SPEC,
            })
        );

        // The bound is on the whole specification, not on each range.
        assert_eq!(
            expand_frame_spec("1-600000, 1-600000"),
            Err(FrameSpecError::TooManyFrames {
                token: "1-600000".to_string(),
                max: MAX_FRAMES_PER_SPEC,
            })
        );
        assert_eq!(
            expand_frame_spec("1-1000000").map(|frames| frames.len()),
            Ok(MAX_FRAMES_PER_SPEC)
        );
        assert!(matches!(
            expand_frame_spec("1-1000000,7"),
            Err(FrameSpecError::TooManyFrames { .. })
        ));
    }

    proptest! {
        #[test]
        fn range_expands_to_every_frame_between_bounds(start in 0i64..10_000, length in 0i64..200) {
            let end = start + length;
            let frames = expand_frame_spec(&format!("{start}-{end}")).unwrap();

            prop_assert_eq!(frames.len() as i64, length + 1);
            prop_assert_eq!(frames.first().copied(), Some(start));
            prop_assert_eq!(frames.last().copied(), Some(end));
            prop_assert!(frames.windows(2).all(|pair| pair[1] == pair[0] + 1));
        }

        #[test]
        fn single_frame_lists_are_preserved(frames in proptest::collection::vec(0i64..100_000, 1..50)) {
            let spec = frames
                .iter()
                .map(|frame| frame.to_string())
                .collect::<Vec<_>>()
                .join(",");

            prop_assert_eq!(expand_frame_spec(&spec).unwrap(), frames);
        }
    }
}
