//! Raw sensor-scan parsing.
//!
//! Both parsers are total: unrecognised lines are skipped and logged, and an
//! empty scan produces a zero result instead of an error.

pub mod bluetooth;
pub mod wifi;

pub use bluetooth::{parse_bt_lines, parse_bt_scan, unique_devices};
pub use wifi::{ApSelection, WifiReading, parse_wifi_lines, parse_wifi_scan, signal_strengths};

/// Reduce one scan cycle to the scalars the fog keeps: the `top_n` strongest
/// signal values and the distinct Bluetooth device count.
pub fn process_signals<W, B, S, T>(wifi_lines: W, bt_lines: B, top_n: usize) -> (Vec<i32>, u32)
where
    W: IntoIterator<Item = S>,
    S: AsRef<str>,
    B: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let wifi = parse_wifi_lines(wifi_lines, ApSelection::Top(top_n));
    (signal_strengths(&wifi), parse_bt_lines(bt_lines))
}
