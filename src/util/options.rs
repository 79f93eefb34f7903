//! A typed, validated, environment-overridable settings surface, built with
//! the same `options!` macro shape the teacher uses: each field carries its
//! own validator and a flag for whether it may be set from an env var.

use std::default::Default;
use std::fmt::Debug;
use std::str::FromStr;

fn always_valid<T>(_: &T) -> bool {
    true
}

fn is_power_of_two_region_size(v: &usize) -> bool {
    v.is_power_of_two() && *v >= crate::util::constants::MIN_REGION_SIZE_BYTES && *v <= crate::util::constants::MAX_REGION_SIZE_BYTES
}

fn is_percent(v: &u8) -> bool {
    *v <= 100
}

fn is_nonzero_percent(v: &u8) -> bool {
    *v >= 1 && *v <= 100
}

/// An optionally-bounded region count. `""`/`"none"` parses to "unbounded,
/// let the sizing policy decide"; any other value parses as a plain `usize`.
/// A newtype (rather than `Option<usize>` directly) because the `options!`
/// macro needs a `FromStr` impl to wire up env-var parsing, and the standard
/// library does not provide one for `Option<T>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaybeRegionCount(pub Option<usize>);

impl std::str::FromStr for MaybeRegionCount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            Ok(MaybeRegionCount(None))
        } else {
            Ok(MaybeRegionCount(Some(s.parse()?)))
        }
    }
}

impl std::ops::Deref for MaybeRegionCount {
    type Target = Option<usize>;
    fn deref(&self) -> &Option<usize> {
        &self.0
    }
}

/// A single option's current value plus the metadata needed to validate and
/// gate where it may be set from. Deref to the value for ergonomic reads.
#[derive(Clone)]
pub struct G1Option<T: Debug + Clone> {
    value: T,
    validator: fn(&T) -> bool,
    from_env_var: bool,
}

impl<T: Debug + Clone> G1Option<T> {
    pub fn new(value: T, validator: fn(&T) -> bool, from_env_var: bool) -> Self {
        G1Option {
            value,
            validator,
            from_env_var,
        }
    }

    /// Set the option, returning `true` if the value passed validation (and
    /// was applied) or `false` if it was rejected and the old value kept.
    pub fn set(&mut self, value: T) -> bool {
        if (self.validator)(&value) {
            self.value = value;
            true
        } else {
            false
        }
    }
}

impl<T: Debug + Clone> std::ops::Deref for G1Option<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

macro_rules! options {
    (@verify_env($self:expr, $key:expr, $($name:ident),*)) => {
        match $key {
            $(stringify!($name) => assert!($self.$name.from_env_var, "cannot set option {} from an environment variable", $key),)*
            _ => panic!("invalid option key: {}", $key),
        }
    };

    ($($name:ident: $type:ty[env_var: $env_var:expr][$validator:expr] = $default:expr),* $(,)?) => {
        #[derive(Clone)]
        pub struct Options {
            $(pub $name: G1Option<$type>),*
        }

        impl Options {
            fn new() -> Self {
                Options {
                    $($name: G1Option::new($default, $validator, $env_var)),*
                }
            }

            fn set_from_env_var(&mut self, key: &str, val: &str) -> bool {
                options!(@verify_env(self, key, $($name),*));
                self.set_inner(key, val)
            }

            fn set_inner(&mut self, key: &str, val: &str) -> bool {
                match key {
                    $(stringify!($name) => if let Ok(parsed) = val.parse::<$type>() {
                        let ok = self.$name.set(parsed);
                        if !ok {
                            eprintln!("warn: rejected {}={:?}, value failed validation; keeping previous value", key, val);
                        }
                        ok
                    } else {
                        eprintln!("warn: could not parse {}={:?}; keeping previous value", key, val);
                        false
                    },)*
                    _ => panic!("invalid option key: {}", key),
                }
            }

            /// Apply any `G1_`-prefixed environment variables matching a
            /// known option name, e.g. `G1_MAX_PAUSE_MILLIS=50`.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "G1_";
                for (key, val) in std::env::vars() {
                    if let Some(rest) = key.strip_prefix(PREFIX) {
                        let lowercase = rest.to_lowercase();
                        match lowercase.as_str() {
                            $(stringify!($name) => { self.set_from_env_var(&lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }

        impl Default for Options {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

options! {
    region_size_bytes: usize[env_var: true][is_power_of_two_region_size] = crate::util::constants::DEFAULT_REGION_SIZE_BYTES,
    initial_heap_bytes: usize[env_var: true][always_valid] = 32 * crate::util::constants::BYTES_IN_MBYTE,
    max_heap_bytes: usize[env_var: true][always_valid] = 1024 * crate::util::constants::BYTES_IN_MBYTE,
    parallel_workers: usize[env_var: true][always_valid] = 0,
    max_pause_millis: u64[env_var: true][always_valid] = 200,
    heap_waste_percent: u8[env_var: true][is_percent] = 10,
    ihop_percent: u8[env_var: true][is_nonzero_percent] = 45,
    adaptive_ihop: bool[env_var: true][always_valid] = true,
    survivor_alignment_bytes: usize[env_var: true][always_valid] = 0,
    conc_mark_initiates_on_system_gc: bool[env_var: true][always_valid] = true,
    min_young_length: usize[env_var: true][always_valid] = 1,
    max_young_length: MaybeRegionCount[env_var: true][always_valid] = MaybeRegionCount(None),
    max_old_cset_length: usize[env_var: true][always_valid] = usize::MAX,
    min_old_cset_length: usize[env_var: true][always_valid] = 0,
}

impl Options {
    /// Resolve `parallel_workers`: a configured `0` means "use all cores",
    /// mirroring the teacher's `threads` option default.
    pub fn resolved_parallel_workers(&self) -> usize {
        if *self.parallel_workers == 0 {
            num_cpus::get()
        } else {
            *self.parallel_workers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_set_keeps_previous_value() {
        let mut options = Options::default();
        assert!(!options.region_size_bytes.set(3));
        assert_eq!(*options.region_size_bytes, crate::util::constants::DEFAULT_REGION_SIZE_BYTES);
        assert!(options.region_size_bytes.set(2 * crate::util::constants::BYTES_IN_MBYTE));
        assert_eq!(*options.region_size_bytes, 2 * crate::util::constants::BYTES_IN_MBYTE);
    }

    #[test]
    fn nonzero_percent_validator_rejects_zero() {
        let mut options = Options::default();
        assert!(!options.ihop_percent.set(0));
        assert!(options.ihop_percent.set(60));
        assert_eq!(*options.ihop_percent, 60);
    }

    #[test]
    fn maybe_region_count_parses_none_and_numbers() {
        assert_eq!("none".parse::<MaybeRegionCount>().unwrap(), MaybeRegionCount(None));
        assert_eq!("".parse::<MaybeRegionCount>().unwrap(), MaybeRegionCount(None));
        assert_eq!("NONE".parse::<MaybeRegionCount>().unwrap(), MaybeRegionCount(None));
        assert_eq!("42".parse::<MaybeRegionCount>().unwrap(), MaybeRegionCount(Some(42)));
    }

    #[test]
    fn set_inner_parses_and_applies_by_key_name() {
        let mut options = Options::default();
        assert!(options.set_inner("max_pause_millis", "50"));
        assert_eq!(*options.max_pause_millis, 50);
        assert!(!options.set_inner("max_pause_millis", "not-a-number"));
        assert_eq!(*options.max_pause_millis, 50);
    }

    #[test]
    fn resolved_parallel_workers_falls_back_to_num_cpus_when_zero() {
        let options = Options::default();
        assert_eq!(*options.parallel_workers, 0);
        assert!(options.resolved_parallel_workers() >= 1);
    }
}
