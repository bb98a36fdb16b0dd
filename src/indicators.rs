use crate::market::Candle;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

/// Simple moving average of the closes of `candles`, which must hold exactly `period` entries.
pub fn simple_moving_average(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() != period {
        return None;
    }

    let mut sma = SimpleMovingAverage::new(period).ok()?;
    let mut last = None;
    for candle in candles {
        last = Some(sma.next(candle.close));
    }
    last
}
