//! Host GPIO adapter: implements [`GpioPort`] for `DirectLine` channels.
//!
//! On the ESP32-S3 this is a thin layer over the IDF GPIO driver using
//! raw sys calls.  On other targets the pins are an in-memory array so
//! the channel bank can be exercised in simulation.

use log::info;

use crate::app::ports::GpioPort;
use crate::config::Direction;
use crate::error::HardwareError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const PIN_COUNT: usize = crate::pins::GPIO_COUNT as usize;

pub struct EspGpio {
    configured: [Option<Direction>; PIN_COUNT],
    #[cfg(not(target_os = "espidf"))]
    levels: [bool; PIN_COUNT],
}

impl Default for EspGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl EspGpio {
    pub fn new() -> Self {
        Self {
            configured: [None; PIN_COUNT],
            #[cfg(not(target_os = "espidf"))]
            levels: [false; PIN_COUNT],
        }
    }

    fn check(&self, pin: u8, err: HardwareError) -> Result<(), HardwareError> {
        match self.configured.get(pin as usize) {
            Some(Some(_)) => Ok(()),
            _ => Err(err),
        }
    }

    /// Simulation only: drive an input line from outside.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_input_level(&mut self, pin: u8, high: bool) {
        if let Some(l) = self.levels.get_mut(pin as usize) {
            *l = high;
        }
    }

    /// Simulation only: the level a line is currently at.
    #[cfg(not(target_os = "espidf"))]
    pub fn level(&self, pin: u8) -> bool {
        self.levels.get(pin as usize).copied().unwrap_or(false)
    }
}

impl GpioPort for EspGpio {
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<(), HardwareError> {
        let slot = self
            .configured
            .get_mut(pin as usize)
            .ok_or(HardwareError::GpioConfig { pin })?;

        #[cfg(target_os = "espidf")]
        {
            let (mode, pull_up) = match direction {
                Direction::Input => (gpio_mode_t_GPIO_MODE_INPUT, gpio_pullup_t_GPIO_PULLUP_ENABLE),
                Direction::Output => (gpio_mode_t_GPIO_MODE_OUTPUT, gpio_pullup_t_GPIO_PULLUP_DISABLE),
            };
            let cfg = gpio_config_t {
                pin_bit_mask: 1u64 << pin,
                mode,
                pull_up_en: pull_up,
                pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
                intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
            };
            // SAFETY: cfg is a fully initialised descriptor for one valid pin.
            let ret = unsafe { gpio_config(&cfg) };
            if ret != ESP_OK as i32 {
                return Err(HardwareError::GpioConfig { pin });
            }
        }

        *slot = Some(direction);
        info!("gpio {}: {:?}", pin, direction);
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<bool, HardwareError> {
        self.check(pin, HardwareError::GpioRead { pin })?;

        // SAFETY: register read of a configured pin.
        #[cfg(target_os = "espidf")]
        let high = unsafe { gpio_get_level(i32::from(pin)) } != 0;
        #[cfg(not(target_os = "espidf"))]
        let high = self.levels[pin as usize];

        Ok(high)
    }

    fn write(&mut self, pin: u8, high: bool) -> Result<(), HardwareError> {
        match self.configured.get(pin as usize) {
            Some(Some(Direction::Output)) => {}
            _ => return Err(HardwareError::GpioWrite { pin }),
        }

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: pin was configured as an output above.
            let ret = unsafe { gpio_set_level(i32::from(pin), u32::from(high)) };
            if ret != ESP_OK as i32 {
                return Err(HardwareError::GpioWrite { pin });
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.levels[pin as usize] = high;
        }
        Ok(())
    }
}
