use std::fmt;

use crate::rng::split_mix;

/// Coordinates of one cell of the result grid.
///
/// Thin indices refer to entries of the first, second and third thin period
/// lists; an entry may itself be "no thin". `rotation_index` and
/// `discount_rate_index` are `None` for runs that evaluate every rotation and
/// discount rate at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridPosition {
    pub discount_rate_index: Option<usize>,
    pub first_thin_period_index: usize,
    pub second_thin_period_index: usize,
    pub third_thin_period_index: usize,
    pub rotation_index: Option<usize>,
    pub parameter_index: usize,
}

impl GridPosition {
    /// Whether the position stands for every rotation and discount rate.
    pub fn covers_all_rotations_and_rates(&self) -> bool {
        self.rotation_index.is_none() || self.discount_rate_index.is_none()
    }

    /// The concrete position at one rotation and discount rate.
    pub fn at(&self, rotation_index: usize, discount_rate_index: usize) -> Self {
        Self {
            rotation_index: Some(rotation_index),
            discount_rate_index: Some(discount_rate_index),
            ..*self
        }
    }

    /// Stable key used to derive a run's pseudorandom stream.
    ///
    /// Every field is mixed in at full width. Markers carry their own tag so
    /// "all" never aliases a concrete index.
    pub fn seed_key(&self) -> u64 {
        let marker = |index: Option<usize>| match index {
            Some(index) => [1, index as u64],
            None => [0, 0],
        };
        let [rate_tag, rate] = marker(self.discount_rate_index);
        let [rotation_tag, rotation] = marker(self.rotation_index);
        [
            rate_tag,
            rate,
            self.first_thin_period_index as u64,
            self.second_thin_period_index as u64,
            self.third_thin_period_index as u64,
            rotation_tag,
            rotation,
            self.parameter_index as u64,
        ]
        .into_iter()
        .fold(0, |key, field| {
            let mut state = key ^ field;
            split_mix(&mut state)
        })
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = |index: Option<usize>| index.map_or("all".to_string(), |i| i.to_string());
        write!(
            f,
            "parameters {}, thins ({}, {}, {}), rotation {}, discount rate {}",
            self.parameter_index,
            self.first_thin_period_index,
            self.second_thin_period_index,
            self.third_thin_period_index,
            index(self.rotation_index),
            index(self.discount_rate_index)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> GridPosition {
        GridPosition {
            discount_rate_index: None,
            first_thin_period_index: 1,
            second_thin_period_index: 0,
            third_thin_period_index: 0,
            rotation_index: None,
            parameter_index: 2,
        }
    }

    #[test]
    fn test_at_resolves_markers() {
        let all = position();
        assert!(all.covers_all_rotations_and_rates());
        let cell = all.at(3, 1);
        assert!(!cell.covers_all_rotations_and_rates());
        assert_eq!(cell.rotation_index, Some(3));
        assert_eq!(cell.discount_rate_index, Some(1));
        assert_eq!(cell.parameter_index, 2);
    }

    #[test]
    fn test_seed_keys_differ_between_positions() {
        let all = position();
        let mut keys = vec![all.seed_key()];
        for rotation in 0..4 {
            for rate in 0..3 {
                keys.push(all.at(rotation, rate).seed_key());
            }
        }
        let count = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), count);
    }

    #[test]
    fn test_seed_keys_use_full_index_width() {
        let base = position().at(0, 0);
        let wide_rate = position().at(0, 256);
        let wide_thin = GridPosition {
            first_thin_period_index: 256,
            ..base
        };
        let wide_parameter = GridPosition {
            parameter_index: 1 << 16,
            ..base
        };
        let wide_rotation = position().at(1 << 16, 0);
        for wide in [wide_rate, wide_thin, wide_parameter, wide_rotation] {
            assert_ne!(wide.seed_key(), base.seed_key(), "{}", wide);
        }

        let rate_255 = GridPosition {
            discount_rate_index: Some(255),
            ..position()
        };
        assert_ne!(rate_255.seed_key(), position().seed_key());
        let rotation_max = position().at(usize::MAX, 0);
        let rotation_all = GridPosition {
            discount_rate_index: Some(0),
            ..position()
        };
        assert_ne!(rotation_max.seed_key(), rotation_all.seed_key());
    }

    #[test]
    fn test_seed_keys_are_unique_across_a_wide_grid() {
        let mut keys = Vec::new();
        for rate in 250..260 {
            for thin in 250..260 {
                for parameter in 0..3 {
                    let position = GridPosition {
                        discount_rate_index: Some(rate),
                        first_thin_period_index: thin,
                        second_thin_period_index: 0,
                        third_thin_period_index: 0,
                        rotation_index: Some(rate + thin),
                        parameter_index: parameter,
                    };
                    keys.push(position.seed_key());
                }
            }
        }
        let count = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), count);
    }

    #[test]
    fn test_display_names_markers() {
        assert_eq!(
            position().to_string(),
            "parameters 2, thins (1, 0, 0), rotation all, discount rate all"
        );
    }
}
