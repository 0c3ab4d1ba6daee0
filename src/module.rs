//! Registration with the host application and creation of the input device.

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::controller::analog::AxisKind;
use crate::controller::events::EventSink;
use crate::controller::interface::{DualSenseInterface, InputDevice};
use crate::transport::Transport;

pub const MODULE_NAME: &str = "padfusion";
/// Feature name under which input device modules are registered.
pub const INPUT_DEVICE_FEATURE: &str = "InputDeviceModule";
pub const MENU_CATEGORY: &str = "DualSense";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDetails {
    pub name: &'static str,
    pub display_name: &'static str,
    pub axis: bool,
    pub category: &'static str,
}

/// Host-side registry of modular features and bindable keys.
pub trait FeatureRegistry {
    fn register_feature(&mut self, feature: &str, module: &str);
    fn unregister_feature(&mut self, feature: &str, module: &str);
    fn register_key(&mut self, key: KeyDetails);
}

/// Keys added by this module on top of the standard gamepad set.
pub fn gyro_keys() -> [KeyDetails; 2] {
    [
        KeyDetails {
            name: AxisKind::GyroX.key_name(),
            display_name: "DualSense Gyroscope X",
            axis: true,
            category: MENU_CATEGORY,
        },
        KeyDetails {
            name: AxisKind::GyroY.key_name(),
            display_name: "DualSense Gyroscope Y",
            axis: true,
            category: MENU_CATEGORY,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct PadModule {
    config: EngineConfig,
    started: bool,
}

impl PadModule {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn startup(&mut self, registry: &mut dyn FeatureRegistry) {
        if self.started {
            warn!("Module {} already started", MODULE_NAME);
            return;
        }
        for key in gyro_keys() {
            registry.register_key(key);
        }
        registry.register_feature(INPUT_DEVICE_FEATURE, MODULE_NAME);
        self.started = true;
        info!("Module {} started", MODULE_NAME);
    }

    pub fn shutdown(&mut self, registry: &mut dyn FeatureRegistry) {
        if !self.started {
            return;
        }
        registry.unregister_feature(INPUT_DEVICE_FEATURE, MODULE_NAME);
        self.started = false;
        info!("Module {} shut down", MODULE_NAME);
    }

    pub fn create_input_device(
        &self,
        transport: Box<dyn Transport>,
        sink: Box<dyn EventSink>,
    ) -> Box<dyn InputDevice> {
        info!("Creating input device");
        Box::new(DualSenseInterface::new(self.config.clone(), transport, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::events::NullSink;
    use crate::transport::{ReplayCapture, ReplayTransport};

    #[derive(Default)]
    struct Registry {
        features: Vec<(String, String)>,
        keys: Vec<KeyDetails>,
    }

    impl FeatureRegistry for Registry {
        fn register_feature(&mut self, feature: &str, module: &str) {
            self.features.push((feature.to_string(), module.to_string()));
        }

        fn unregister_feature(&mut self, feature: &str, module: &str) {
            self.features.retain(|(f, m)| !(f == feature && m == module));
        }

        fn register_key(&mut self, key: KeyDetails) {
            self.keys.push(key);
        }
    }

    #[test]
    fn startup_registers_feature_and_gyro_keys() {
        let mut registry = Registry::default();
        let mut module = PadModule::new(EngineConfig::default());

        module.startup(&mut registry);
        module.startup(&mut registry);
        assert!(module.is_started());
        assert_eq!(registry.features.len(), 1);
        let names: Vec<_> = registry.keys.iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["DS5W_GyroAxis_X", "DS5W_GyroAxis_Y"]);

        module.shutdown(&mut registry);
        assert!(registry.features.is_empty());
        assert!(!module.is_started());
    }

    #[test]
    fn device_without_capture_is_not_attached() {
        let module = PadModule::new(EngineConfig::default());
        let device = module.create_input_device(
            Box::new(ReplayTransport::new(ReplayCapture::default())),
            Box::new(NullSink),
        );
        assert!(!device.is_attached());
    }
}
