//! Input providers consulted by the update loop before every step.

use std::collections::BTreeMap;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simbridge_sys::Sample;

use crate::config::InputConfig;
use crate::error::{ConfigError, HostError, MarshalError};
use crate::marshal;

/// Range random fields are drawn from unless configured otherwise.
pub const DEFAULT_RANGE: (f64, f64) = (100.0, 200.0);

/// Supplies the input for each step.
///
/// `input` holds the previous step's values, so a source may update only
/// some fields.
pub trait InputSource<I: Sample>: Send {
    fn refresh(&mut self, time_s: f64, input: &mut I);
}

impl<I, F> InputSource<I> for F
where
    I: Sample,
    F: FnMut(f64, &mut I) + Send,
{
    fn refresh(&mut self, time_s: f64, input: &mut I) {
        self(time_s, input)
    }
}

/// The same input every step.
#[derive(Debug, Clone, Copy)]
pub struct ConstantInput<I: Sample> {
    value: I,
}

impl<I: Sample> ConstantInput<I> {
    pub fn new(value: I) -> Self {
        Self { value }
    }
}

impl<I: Sample> InputSource<I> for ConstantInput<I> {
    fn refresh(&mut self, _time_s: f64, input: &mut I) {
        *input = self.value;
    }
}

/// Draws every field uniformly from its own half-open range.
#[derive(Debug)]
pub struct RandomInput<I: Sample> {
    ranges: Vec<(f64, f64)>,
    rng: StdRng,
    _sample: std::marker::PhantomData<fn() -> I>,
}

impl<I: Sample> RandomInput<I> {
    /// Every field drawn from `low..high`.
    pub fn uniform(low: f64, high: f64, seed: Option<u64>) -> Result<Self, ConfigError> {
        Self::with_ranges(vec![(low, high); I::FIELDS.len()], seed)
    }

    /// One range per field, in declaration order.
    pub fn with_ranges(ranges: Vec<(f64, f64)>, seed: Option<u64>) -> Result<Self, ConfigError> {
        for (field, (low, high)) in I::FIELDS.iter().zip(&ranges) {
            check_range(field, *low, *high)?;
        }
        let mut ranges = ranges;
        ranges.resize(I::FIELDS.len(), DEFAULT_RANGE);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            ranges,
            rng,
            _sample: std::marker::PhantomData,
        })
    }

    /// Starts from `default` and overrides named fields.
    pub fn with_named_ranges(
        variant: &'static str,
        default: (f64, f64),
        named: &BTreeMap<String, (f64, f64)>,
        seed: Option<u64>,
    ) -> Result<Self, HostError> {
        let mut ranges = vec![default; I::FIELDS.len()];
        for (name, range) in named {
            let index =
                marshal::field_index::<I>(name).ok_or_else(|| MarshalError::UnknownField {
                    variant,
                    field: name.clone(),
                })?;
            ranges[index] = *range;
        }
        Ok(Self::with_ranges(ranges, seed)?)
    }
}

/// A usable sampling range: finite, non-empty, and with a finite width.
pub(crate) fn check_range(field: &str, low: f64, high: f64) -> Result<(), ConfigError> {
    if low.is_finite() && high.is_finite() && low < high && (high - low).is_finite() {
        Ok(())
    } else {
        Err(ConfigError::EmptyRange {
            field: field.to_string(),
            low,
            high,
        })
    }
}

impl<I: Sample> InputSource<I> for RandomInput<I> {
    fn refresh(&mut self, _time_s: f64, input: &mut I) {
        for (index, (low, high)) in self.ranges.iter().enumerate() {
            input.set(index, self.rng.gen_range(*low..*high));
        }
    }
}

/// Inputs pushed from another thread. The latest value wins; when nothing
/// new arrived the previous input is reused.
#[derive(Debug)]
pub struct FeedInput<I: Sample> {
    receiver: Receiver<I>,
    current: I,
}

/// Sending half of a [`FeedInput`].
#[derive(Debug, Clone)]
pub struct FeedSender<I: Sample> {
    sender: Sender<I>,
}

impl<I: Sample> FeedInput<I> {
    pub fn new(initial: I) -> (FeedSender<I>, Self) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            FeedSender { sender },
            Self {
                receiver,
                current: initial,
            },
        )
    }
}

impl<I: Sample> FeedSender<I> {
    /// Queues `input` for the next step. Returns `false` once the feed is gone.
    pub fn push(&self, input: I) -> bool {
        match self.sender.try_send(input) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl<I: Sample> InputSource<I> for FeedInput<I> {
    fn refresh(&mut self, _time_s: f64, input: &mut I) {
        if let Some(latest) = self.receiver.try_iter().last() {
            self.current = latest;
        }
        *input = self.current;
    }
}

/// Input source described by a configuration file.
#[derive(Debug)]
pub enum ConfiguredInput<I: Sample> {
    Constant(ConstantInput<I>),
    Random(RandomInput<I>),
}

impl<I: Sample> ConfiguredInput<I> {
    pub fn from_config(
        variant: &'static str,
        config: &InputConfig,
        seed: Option<u64>,
    ) -> Result<Self, HostError> {
        match config {
            InputConfig::Constant { values } => {
                let value = marshal::from_named::<I>(variant, values)?;
                Ok(ConfiguredInput::Constant(ConstantInput::new(value)))
            }
            InputConfig::Random { range, fields } => {
                let named = fields
                    .iter()
                    .map(|(name, [low, high])| (name.clone(), (*low, *high)))
                    .collect();
                let source = RandomInput::with_named_ranges(
                    variant,
                    (range[0], range[1]),
                    &named,
                    seed,
                )?;
                Ok(ConfiguredInput::Random(source))
            }
        }
    }
}

impl<I: Sample> InputSource<I> for ConfiguredInput<I> {
    fn refresh(&mut self, time_s: f64, input: &mut I) {
        match self {
            ConfiguredInput::Constant(source) => source.refresh(time_s, input),
            ConfiguredInput::Random(source) => source.refresh(time_s, input),
        }
    }
}
