//! Channel bank over the simulated mezzanine.

use iotflow::adapters::hardware::EspGpio;
use iotflow::channel::{ChannelBank, ChannelId, ChannelIo, ChannelValue, IoHal};
use iotflow::error::HardwareError;

use crate::mock_hw::{bank, default_config, MockI2c, NoopDelay, ADC0_ADDR, EXPANDER_ADDR};

fn ch(i: u8) -> ChannelId {
    ChannelId::new(i).unwrap()
}

#[test]
fn init_sets_expander_directions_with_outputs_low() {
    let bus = MockI2c::combo_board();
    let _bank = bank(&default_config(), &bus);

    // Bits 6 and 7 drive relays; everything else stays an input.
    assert_eq!(bus.expander_config(), 0b0011_1111);
    assert_eq!(bus.expander_output(), 0);
}

#[test]
fn init_fails_when_expander_is_missing() {
    let bus = MockI2c::combo_board();
    bus.kill(EXPANDER_ADDR);
    let hal = IoHal {
        i2c: bus.clone(),
        gpio: EspGpio::new(),
        delay: NoopDelay,
    };
    let err = ChannelBank::new(&default_config(), hal).err();
    assert_eq!(err, Some(HardwareError::I2c { addr: EXPANDER_ADDR }));
}

#[test]
fn only_outputs_are_writable() {
    let bus = MockI2c::combo_board();
    let mut bank = bank(&default_config(), &bus);

    assert_eq!(bank.write(ch(0), true), Err(HardwareError::NotWritable));
    assert_eq!(bank.write(ch(2), true), Err(HardwareError::NotWritable));
    assert_eq!(bank.write(ch(4), true), Err(HardwareError::NotWritable));
    assert_eq!(bank.write(ch(3), true), Ok(()));
    assert_eq!(bank.write(ch(7), true), Ok(()));
    assert_eq!(bus.expander_output(), 0b1000_0000);
}

#[test]
fn gpio_output_reads_back_latched_value() {
    let bus = MockI2c::combo_board();
    let mut bank = bank(&default_config(), &bus);

    assert_eq!(bank.read(ch(3)), Ok(ChannelValue::Digital(false)));
    bank.write(ch(3), true).unwrap();
    assert_eq!(bank.read(ch(3)), Ok(ChannelValue::Digital(true)));
}

#[test]
fn gpio_input_follows_the_line() {
    let bus = MockI2c::combo_board();
    let mut bank = bank(&default_config(), &bus);

    assert_eq!(bank.read(ch(2)), Ok(ChannelValue::Digital(false)));
    bank.hal_mut().gpio.set_input_level(12, true);
    assert_eq!(bank.read(ch(2)), Ok(ChannelValue::Digital(true)));
}

#[test]
fn expander_input_reads_its_own_bit() {
    let bus = MockI2c::combo_board();
    let mut bank = bank(&default_config(), &bus);

    bus.set_expander_pin(5, true);
    assert_eq!(bank.read(ch(4)), Ok(ChannelValue::Digital(false)));
    assert_eq!(bank.read(ch(5)), Ok(ChannelValue::Digital(true)));
}

#[test]
fn analog_channels_use_their_own_pair_and_scaling() {
    let bus = MockI2c::combo_board();
    let mut bank = bank(&default_config(), &bus);

    // 12 mA through the 0.249 Ω shunt behind the input divider.
    let adc_volts = 12.0 * 0.249 * 0.237_619_05;
    bus.set_adc_raw(ADC0_ADDR, 1, (adc_volts * 32_768.0 / 4.096_f32).round() as i16);
    bus.set_adc_raw(ADC0_ADDR, 0, 0);

    let ma = bank.read(ch(1)).unwrap().as_analog().unwrap();
    assert!((ma - 12.0).abs() < 0.01, "{ma}");
    let volts = bank.read(ch(0)).unwrap().as_analog().unwrap();
    assert!(volts.abs() < 0.001, "{volts}");
}

#[test]
fn stuck_converter_times_out() {
    let bus = MockI2c::combo_board();
    let mut bank = bank(&default_config(), &bus);

    bus.set_adc_stuck(ADC0_ADDR, true);
    assert_eq!(bank.read(ch(0)), Err(HardwareError::ConversionTimeout { addr: ADC0_ADDR }));
}
