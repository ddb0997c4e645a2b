use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Compute device on which an algorithm keeps its parameters.
///
/// Backend crates convert this into their own device type; this enum exists
/// so that configurations can be serialized without depending on a backend.
#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU with the given ordinal.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(n) => write!(f, "cuda:{}", n),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    /// Accepts `cpu`, `gpu` (first GPU), `cuda` and `cuda:<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Cuda(0)),
            other => match other.strip_prefix("cuda:") {
                Some(n) => n
                    .parse()
                    .map(Self::Cuda)
                    .map_err(|_| format!("invalid device ordinal: {}", n)),
                None => Err(format!("unknown device: {}", s)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Device;

    #[test]
    fn test_parse_device() {
        assert_eq!("cpu".parse::<Device>(), Ok(Device::Cpu));
        assert_eq!("GPU".parse::<Device>(), Ok(Device::Cuda(0)));
        assert_eq!("cuda:2".parse::<Device>(), Ok(Device::Cuda(2)));
        assert!("tpu".parse::<Device>().is_err());
        assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
    }
}
