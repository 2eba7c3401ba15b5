//! Network server configuration.
//!
//! Every value has a default matching the EU868 Class A behaviour. The struct is
//! serde-enabled so a harness can load it from whatever format it uses; the crate
//! itself reads no files.

use crate::adr::AdrConfig;
use crate::constants::{
    DEDUP_WINDOW, DEFAULT_NUMBER_DS_TRANSMISSIONS, LORAWAN_MIN_DOWNLINK_PACKET_SIZE,
    RECEIVE_DELAY1, RECEIVE_DELAY2, RW2_CHANNEL_INDEX, RW2_DATA_RATE_INDEX, SNR_HISTORY_DEPTH,
};
use crate::error::NetworkServerError;
use rand::Rng;
use rand_distr::{Distribution, Exp, Uniform};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Distribution of the delay between two generated downlinks for one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InterArrival {
    Constant { seconds: f64 },
    Exponential { mean_seconds: f64 },
    Uniform { min_seconds: f64, max_seconds: f64 },
}

impl Default for InterArrival {
    fn default() -> Self {
        InterArrival::Exponential { mean_seconds: 10.0 }
    }
}

impl InterArrival {
    /// Builds the sampler for this distribution.
    ///
    /// Parameters that `rand_distr` rejects, and delays that do not fit in a
    /// [`Duration`], are configuration errors.
    pub fn sampler(&self) -> Result<InterArrivalSampler, NetworkServerError> {
        let invalid = |reason: String| {
            NetworkServerError::InvalidConfig(format!("downlink inter-arrival {self:?}: {reason}"))
        };
        let delay = |seconds: f64| {
            if seconds < 0.0 {
                return Err(invalid(format!("negative delay {seconds} s")));
            }
            Duration::try_from_secs_f64(seconds).map_err(|err| invalid(err.to_string()))
        };

        match *self {
            InterArrival::Constant { seconds } => {
                let delay = delay(seconds)?;
                if delay.is_zero() {
                    return Err(invalid("delay must be positive".into()));
                }
                Ok(InterArrivalSampler::Constant(delay))
            }
            InterArrival::Exponential { mean_seconds } => {
                if delay(mean_seconds)?.is_zero() {
                    return Err(invalid("mean must be positive".into()));
                }
                let exp = Exp::new(1.0 / mean_seconds).map_err(|err| invalid(err.to_string()))?;
                Ok(InterArrivalSampler::Exponential(exp))
            }
            InterArrival::Uniform {
                min_seconds,
                max_seconds,
            } => {
                let min = delay(min_seconds)?;
                delay(max_seconds)?;
                if max_seconds < min_seconds {
                    Err(invalid("max_seconds is below min_seconds".into()))
                } else if max_seconds == min_seconds {
                    Ok(InterArrivalSampler::Constant(min))
                } else {
                    Ok(InterArrivalSampler::Uniform(Uniform::new(min_seconds, max_seconds)))
                }
            }
        }
    }
}

/// A validated [`InterArrival`] ready to draw delays.
#[derive(Debug, Clone, Copy)]
pub enum InterArrivalSampler {
    Constant(Duration),
    Exponential(Exp<f64>),
    Uniform(Uniform<f64>),
}

impl InterArrivalSampler {
    /// Draws one delay. `None` when the drawn value does not fit in a [`Duration`],
    /// which only the unbounded exponential tail can produce.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Duration> {
        let seconds = match self {
            InterArrivalSampler::Constant(delay) => return Some(*delay),
            InterArrivalSampler::Exponential(exp) => exp.sample(rng),
            InterArrivalSampler::Uniform(uniform) => uniform.sample(rng),
        };
        Duration::try_from_secs_f64(seconds).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Size of a generated downlink packet including MHDR and MIC
    pub downstream_packet_size: usize,
    pub generate_downlink_traffic: bool,
    /// Generated downlinks are confirmed when set
    pub confirmed_downlinks: bool,
    pub downlink_inter_arrival: InterArrival,
    /// Transmission budget of a confirmed downlink
    pub confirmed_transmissions: u8,
    pub adr: AdrConfig,
    pub receive_delay1: Duration,
    pub receive_delay2: Duration,
    pub dedup_window: Duration,
    pub snr_history_depth: usize,
    pub rw2_channel_index: u8,
    pub rw2_data_rate_index: u8,
    pub rx1_data_rate_offset: u8,
    pub rng_seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            downstream_packet_size: 21,
            generate_downlink_traffic: false,
            confirmed_downlinks: false,
            downlink_inter_arrival: InterArrival::default(),
            confirmed_transmissions: DEFAULT_NUMBER_DS_TRANSMISSIONS,
            adr: AdrConfig::default(),
            receive_delay1: RECEIVE_DELAY1,
            receive_delay2: RECEIVE_DELAY2,
            dedup_window: DEDUP_WINDOW,
            snr_history_depth: SNR_HISTORY_DEPTH,
            rw2_channel_index: RW2_CHANNEL_INDEX,
            rw2_data_rate_index: RW2_DATA_RATE_INDEX,
            rx1_data_rate_offset: 0,
            rng_seed: 1,
        }
    }
}

impl ServerConfig {
    /// Collects every configuration problem. The server keeps running with the
    /// affected feature disabled, so nothing here is fatal.
    pub fn validate(&self) -> Vec<NetworkServerError> {
        let mut errors = Vec::new();

        if self.generate_downlink_traffic
            && self.downstream_packet_size < LORAWAN_MIN_DOWNLINK_PACKET_SIZE
        {
            errors.push(NetworkServerError::PacketSizeTooSmall {
                size: self.downstream_packet_size,
                minimum: LORAWAN_MIN_DOWNLINK_PACKET_SIZE,
            });
        }
        if self.generate_downlink_traffic {
            if let Err(err) = self.downlink_inter_arrival.sampler() {
                errors.push(err);
            }
        }
        if self.confirmed_transmissions == 0 {
            errors.push(NetworkServerError::InvalidConfig(
                "confirmed_transmissions must be at least 1".into(),
            ));
        }
        if self.receive_delay2 <= self.receive_delay1 {
            errors.push(NetworkServerError::InvalidConfig(format!(
                "receive_delay2 ({:?}) must be after receive_delay1 ({:?})",
                self.receive_delay2, self.receive_delay1
            )));
        }
        if self.snr_history_depth == 0 {
            errors.push(NetworkServerError::InvalidConfig(
                "snr_history_depth must be at least 1".into(),
            ));
        }
        errors.extend(self.adr.validate());

        errors
    }

    /// Whether downlink traffic generation can run with this configuration.
    pub fn traffic_generation_enabled(&self) -> bool {
        self.generate_downlink_traffic
            && self.downstream_packet_size >= LORAWAN_MIN_DOWNLINK_PACKET_SIZE
            && self.downlink_inter_arrival.sampler().is_ok()
    }

    /// Payload bytes of a generated downlink (packet minus header, MHDR and MIC).
    pub fn downlink_payload_size(&self) -> usize {
        self.downstream_packet_size
            .saturating_sub(LORAWAN_MIN_DOWNLINK_PACKET_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.downlink_payload_size(), 8);
        assert_eq!(config.receive_delay2, Duration::from_secs(2));
    }

    #[test]
    fn test_small_packet_disables_generation() {
        let config = ServerConfig {
            generate_downlink_traffic: true,
            downstream_packet_size: 12,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.validate(),
            vec![NetworkServerError::PacketSizeTooSmall {
                size: 12,
                minimum: 13
            }]
        );
        assert!(!config.traffic_generation_enabled());
    }

    #[test]
    fn test_inter_arrival_sampling() {
        let mut rng = StdRng::seed_from_u64(7);
        let constant = InterArrival::Constant { seconds: 2.5 }.sampler().unwrap();
        assert_eq!(constant.sample(&mut rng), Some(Duration::from_millis(2500)));

        let uniform = InterArrival::Uniform {
            min_seconds: 1.0,
            max_seconds: 3.0,
        }
        .sampler()
        .unwrap();
        for _ in 0..100 {
            let d = uniform.sample(&mut rng).unwrap();
            assert!(d >= Duration::from_secs(1) && d < Duration::from_secs(3));
        }

        let exponential = InterArrival::default().sampler().unwrap();
        let total: f64 = (0..2000)
            .map(|_| exponential.sample(&mut rng).unwrap().as_secs_f64())
            .sum();
        let mean = total / 2000.0;
        assert!((8.0..12.0).contains(&mean), "mean {mean}");
    }

    #[test]
    fn test_degenerate_uniform_is_constant() {
        let mut rng = StdRng::seed_from_u64(1);
        let sampler = InterArrival::Uniform {
            min_seconds: 4.0,
            max_seconds: 4.0,
        }
        .sampler()
        .unwrap();
        assert_eq!(sampler.sample(&mut rng), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_unusable_inter_arrival_is_a_config_error() {
        let unusable = [
            InterArrival::Constant { seconds: 1e20 },
            InterArrival::Constant { seconds: 0.0 },
            InterArrival::Exponential { mean_seconds: -1.0 },
            InterArrival::Exponential { mean_seconds: f64::NAN },
            InterArrival::Exponential { mean_seconds: 1e30 },
            InterArrival::Uniform {
                min_seconds: 5.0,
                max_seconds: 1.0,
            },
            InterArrival::Uniform {
                min_seconds: 0.0,
                max_seconds: f64::INFINITY,
            },
        ];
        for inter_arrival in unusable {
            let config = ServerConfig {
                generate_downlink_traffic: true,
                downlink_inter_arrival: inter_arrival,
                ..ServerConfig::default()
            };
            assert!(
                matches!(
                    config.validate().as_slice(),
                    [NetworkServerError::InvalidConfig(_)]
                ),
                "{inter_arrival:?}"
            );
            assert!(!config.traffic_generation_enabled(), "{inter_arrival:?}");
        }
    }

    #[test]
    fn test_json_with_missing_fields_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"confirmed_downlinks": true, "rng_seed": 42}"#).unwrap();
        assert!(config.confirmed_downlinks);
        assert_eq!(config.rng_seed, 42);
        assert_eq!(config.downstream_packet_size, 21);
    }
}
