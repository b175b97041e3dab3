//! rppal-backed output lines and the priming feedback input.

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use turret_traits::{LineFactory, LineRole, OutputLine};

use crate::error::{HwError, Result};

/// BCM pin numbers of the four outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub pan: u8,
    pub tilt: u8,
    pub stepper: u8,
    pub solenoid: u8,
}

impl PinMap {
    pub fn pin(&self, role: LineRole) -> u8 {
        match role {
            LineRole::Pan => self.pan,
            LineRole::Tilt => self.tilt,
            LineRole::Stepper => self.stepper,
            LineRole::Solenoid => self.solenoid,
        }
    }
}

fn map_gpio(e: rppal::gpio::Error) -> HwError {
    match e {
        rppal::gpio::Error::PinUsed(pin) => HwError::PinBusy(pin),
        rppal::gpio::Error::PinNotAvailable(pin) => {
            HwError::Unavailable(format!("gpio pin {pin}"))
        }
        other => HwError::Gpio(other.to_string()),
    }
}

pub struct GpioLine {
    role: LineRole,
    pin: OutputPin,
}

impl OutputLine for GpioLine {
    fn set(&mut self, high: bool) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pin.write(if high { Level::High } else { Level::Low });
        Ok(())
    }
}

impl Drop for GpioLine {
    fn drop(&mut self) {
        self.pin.set_low();
        tracing::debug!(line = self.role.name(), pin = self.pin.pin(), "gpio line released");
    }
}

/// `LineFactory` over the Raspberry Pi GPIO header.
pub struct GpioLines {
    gpio: Gpio,
    pins: PinMap,
}

impl GpioLines {
    pub fn new(pins: PinMap) -> Result<Self> {
        let gpio = Gpio::new().map_err(map_gpio)?;
        Ok(Self { gpio, pins })
    }
}

impl LineFactory for GpioLines {
    fn acquire(
        &mut self,
        role: LineRole,
    ) -> std::result::Result<Box<dyn OutputLine>, Box<dyn std::error::Error + Send + Sync>> {
        let n = self.pins.pin(role);
        let pin = self.gpio.get(n).map_err(map_gpio)?.into_output_low();
        tracing::debug!(line = role.name(), pin = n, "gpio line acquired");
        Ok(Box::new(GpioLine { role, pin }))
    }
}

/// Keeps the feedback interrupt registered; dropping it stops the callbacks.
pub struct FeedbackWatch {
    _pin: InputPin,
}

/// Call `on_primed` on every rising edge of the feedback input.
pub fn watch_feedback<F>(pin: u8, mut on_primed: F) -> Result<FeedbackWatch>
where
    F: FnMut() + Send + 'static,
{
    let gpio = Gpio::new().map_err(map_gpio)?;
    let mut input = gpio.get(pin).map_err(map_gpio)?.into_input_pulldown();
    input
        .set_async_interrupt(Trigger::RisingEdge, move |_level: Level| on_primed())
        .map_err(map_gpio)?;
    tracing::info!(pin, "watching priming feedback");
    Ok(FeedbackWatch { _pin: input })
}
