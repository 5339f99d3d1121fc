use crate::domain::errors::FeatureError;
use crate::domain::ml::feature_registry::{FEATURE_NAMES, feature_index, fill_value};
use crate::domain::types::Candle;
use ndarray::{Array2, ArrayView1};
use std::collections::VecDeque;
use ta::Next;
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, FastStochastic, Maximum, Minimum, MoneyFlowIndex,
    MovingAverageConvergenceDivergence, SimpleMovingAverage,
};

// Volume
const CMF_PERIOD: usize = 20;
const FI_PERIOD: usize = 13;
const EM_PERIOD: usize = 14;
const VWAP_PERIOD: usize = 14;
const MFI_PERIOD: usize = 14;
const NVI_START: f64 = 1000.0;
const EM_SCALE: f64 = 100_000_000.0;

// Volatility
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const KC_PERIOD: usize = 20;
const DC_PERIOD: usize = 20;
const ATR_PERIOD: usize = 10;
const UI_PERIOD: usize = 14;

// Trend
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const VORTEX_PERIOD: usize = 14;
const TRIX_PERIOD: usize = 15;
const MASS_FAST: usize = 9;
const MASS_SLOW: usize = 25;
const DPO_PERIOD: usize = 20;
const KST_ROC: [usize; 4] = [10, 15, 20, 30];
const KST_WINDOW: [usize; 4] = [10, 10, 10, 15];
const KST_SIGNAL: usize = 9;
const ICHIMOKU_CONV: usize = 9;
const ICHIMOKU_BASE: usize = 26;
const ICHIMOKU_SPAN_B: usize = 52;
const STC_FAST: usize = 23;
const STC_SLOW: usize = 50;
const STC_CYCLE: usize = 10;
const STC_SMOOTH: usize = 3;
const ADX_PERIOD: usize = 14;
const CCI_PERIOD: usize = 20;
const CCI_CONSTANT: f64 = 0.015;
const AROON_PERIOD: usize = 25;
const PSAR_STEP: f64 = 0.02;
const PSAR_MAX_STEP: f64 = 0.2;

// Momentum
const RSI_PERIOD: usize = 14;
const STOCH_RSI_PERIOD: usize = 14;
const STOCH_RSI_SMOOTH: usize = 3;
const TSI_SLOW: usize = 25;
const TSI_FAST: usize = 13;
const UO_WINDOWS: [usize; 3] = [7, 14, 28];
const UO_WEIGHTS: [f64; 3] = [4.0, 2.0, 1.0];
const STOCH_PERIOD: usize = 14;
const STOCH_SIGNAL: usize = 3;
const WR_PERIOD: usize = 14;
const AO_FAST: usize = 5;
const AO_SLOW: usize = 34;
const ROC_PERIOD: usize = 12;
const KAMA_PERIOD: usize = 10;
const KAMA_FAST: f64 = 2.0;
const KAMA_SLOW: f64 = 30.0;

/// Longest look-back on past closes (KST's slowest rate of change)
const CLOSE_HISTORY: usize = 31;

/// Directional movement values for one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxOutput {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Manual ADX implementation using standard Wilder's smoothing
///
/// Accumulates the first N values as a sum, then applies Wilder's smoothing
pub struct ManualAdx {
    period: usize,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    prev_close: Option<f64>,
    tr_sum: f64,
    plus_dm_sum: f64,
    minus_dm_sum: f64,
    tr_smooth: f64,
    plus_dm_smooth: f64,
    minus_dm_smooth: f64,
    adx_smooth: f64,
    count: usize,
}

impl ManualAdx {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_high: None,
            prev_low: None,
            prev_close: None,
            tr_sum: 0.0,
            plus_dm_sum: 0.0,
            minus_dm_sum: 0.0,
            tr_smooth: 0.0,
            plus_dm_smooth: 0.0,
            minus_dm_smooth: 0.0,
            adx_smooth: 0.0,
            count: 0,
        }
    }

    pub fn next(&mut self, high: f64, low: f64, close: f64) -> AdxOutput {
        let mut output = AdxOutput {
            adx: 0.0,
            plus_di: 0.0,
            minus_di: 0.0,
        };
        let (Some(prev_high), Some(prev_low), Some(prev_close)) =
            (self.prev_high, self.prev_low, self.prev_close)
        else {
            self.prev_high = Some(high);
            self.prev_low = Some(low);
            self.prev_close = Some(close);
            return output;
        };

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        self.count += 1;

        if self.count <= self.period {
            self.tr_sum += tr;
            self.plus_dm_sum += plus_dm;
            self.minus_dm_sum += minus_dm;
            if self.count == self.period {
                self.tr_smooth = self.tr_sum;
                self.plus_dm_smooth = self.plus_dm_sum;
                self.minus_dm_smooth = self.minus_dm_sum;
            }
        } else {
            let n = self.period as f64;
            self.tr_smooth = self.tr_smooth - (self.tr_smooth / n) + tr;
            self.plus_dm_smooth = self.plus_dm_smooth - (self.plus_dm_smooth / n) + plus_dm;
            self.minus_dm_smooth = self.minus_dm_smooth - (self.minus_dm_smooth / n) + minus_dm;
        }

        if self.count >= self.period && self.tr_smooth > 0.0 {
            let plus_di = 100.0 * self.plus_dm_smooth / self.tr_smooth;
            let minus_di = 100.0 * self.minus_dm_smooth / self.tr_smooth;
            let sum_di = plus_di + minus_di;
            let dx = if sum_di > 0.0 {
                100.0 * (plus_di - minus_di).abs() / sum_di
            } else {
                0.0
            };

            if self.count == self.period {
                self.adx_smooth = dx;
            } else {
                self.adx_smooth =
                    ((self.adx_smooth * (self.period as f64 - 1.0)) + dx) / self.period as f64;
            }
            output = AdxOutput {
                adx: self.adx_smooth,
                plus_di,
                minus_di,
            };
        }

        self.prev_high = Some(high);
        self.prev_low = Some(low);
        self.prev_close = Some(close);
        output
    }
}

/// Fixed-size window over the most recent values
struct RollingWindow {
    period: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::with_capacity(period),
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() == self.period {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    fn mean(&self) -> Option<f64> {
        div(self.sum(), self.values.len() as f64)
    }

    fn mean_deviation(&self) -> Option<f64> {
        let mean = self.mean()?;
        div(
            self.values.iter().map(|v| (v - mean).abs()).sum::<f64>(),
            self.values.len() as f64,
        )
    }

    fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Value `bars` steps before the newest one
    fn lag(&self, bars: usize) -> Option<f64> {
        let len = self.values.len();
        (len > bars).then(|| self.values[len - 1 - bars])
    }

    fn lag_or_oldest(&self, bars: usize) -> Option<f64> {
        self.lag(bars).or_else(|| self.values.front().copied())
    }

    /// One-based position of the first maximum (`pick_max`) or minimum
    fn extreme_position(&self, pick_max: bool) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &value) in self.values.iter().enumerate() {
            let better = match best {
                None => true,
                Some((_, current)) if pick_max => value > current,
                Some((_, current)) => value < current,
            };
            if better {
                best = Some((idx, value));
            }
        }
        best.map(|(idx, _)| idx + 1)
    }
}

/// Average true range seeded with a plain mean over the first window
struct WilderAtr {
    period: usize,
    count: usize,
    tr_sum: f64,
    atr: f64,
}

impl WilderAtr {
    fn new(period: usize) -> Self {
        Self {
            period,
            count: 0,
            tr_sum: 0.0,
            atr: 0.0,
        }
    }

    fn next(&mut self, true_range: f64) -> f64 {
        self.count += 1;
        let n = self.period as f64;
        if self.count < self.period {
            self.tr_sum += true_range;
            0.0
        } else if self.count == self.period {
            self.tr_sum += true_range;
            self.atr = self.tr_sum / n;
            self.atr
        } else {
            self.atr = (self.atr * (n - 1.0) + true_range) / n;
            self.atr
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SarOutput {
    up: Option<f64>,
    down: Option<f64>,
    up_indicator: f64,
    down_indicator: f64,
}

/// Parabolic stop-and-reverse, emitted on the side of the current trend
struct ParabolicSar {
    up_trend: bool,
    acceleration: f64,
    up_trend_high: f64,
    down_trend_low: f64,
    psar: f64,
    // (most recent, one before)
    highs: [f64; 2],
    lows: [f64; 2],
    count: usize,
    was_up: bool,
    was_down: bool,
}

impl ParabolicSar {
    fn new() -> Self {
        Self {
            up_trend: true,
            acceleration: PSAR_STEP,
            up_trend_high: 0.0,
            down_trend_low: 0.0,
            psar: 0.0,
            highs: [0.0; 2],
            lows: [0.0; 2],
            count: 0,
            was_up: false,
            was_down: false,
        }
    }

    fn next(&mut self, high: f64, low: f64, close: f64) -> SarOutput {
        self.count += 1;
        if self.count == 1 {
            self.up_trend_high = high;
            self.down_trend_low = low;
        }

        let mut output = SarOutput {
            up: None,
            down: None,
            up_indicator: 0.0,
            down_indicator: 0.0,
        };

        if self.count <= 2 {
            self.psar = close;
        } else {
            let [high1, high2] = self.highs;
            let [low1, low2] = self.lows;
            let prev = self.psar;
            let mut reversal = false;

            if self.up_trend {
                self.psar = prev + self.acceleration * (self.up_trend_high - prev);
                if low < self.psar {
                    reversal = true;
                    self.psar = self.up_trend_high;
                    self.down_trend_low = low;
                    self.acceleration = PSAR_STEP;
                } else {
                    if high > self.up_trend_high {
                        self.up_trend_high = high;
                        self.acceleration = (self.acceleration + PSAR_STEP).min(PSAR_MAX_STEP);
                    }
                    if low2 < self.psar {
                        self.psar = low2;
                    } else if low1 < self.psar {
                        self.psar = low1;
                    }
                }
            } else {
                self.psar = prev - self.acceleration * (prev - self.down_trend_low);
                if high > self.psar {
                    reversal = true;
                    self.psar = self.down_trend_low;
                    self.up_trend_high = high;
                    self.acceleration = PSAR_STEP;
                } else {
                    if low < self.down_trend_low {
                        self.down_trend_low = low;
                        self.acceleration = (self.acceleration + PSAR_STEP).min(PSAR_MAX_STEP);
                    }
                    if high2 > self.psar {
                        self.psar = high2;
                    } else if high1 > self.psar {
                        self.psar = high1;
                    }
                }
            }

            self.up_trend = self.up_trend != reversal;
            if self.up_trend {
                output.up = Some(self.psar);
                output.up_indicator = if self.was_up { 0.0 } else { 1.0 };
            } else {
                output.down = Some(self.psar);
                output.down_indicator = if self.was_down { 0.0 } else { 1.0 };
            }
        }

        self.was_up = output.up.is_some();
        self.was_down = output.down.is_some();
        self.highs = [high, self.highs[0]];
        self.lows = [low, self.lows[0]];
        output
    }
}

/// Division that has no value when the denominator is zero
fn div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator.abs() > f64::EPSILON {
        Some(numerator / denominator)
    } else {
        None
    }
}

fn flag(condition: bool) -> Option<f64> {
    Some(if condition { 1.0 } else { 0.0 })
}

fn indicator<T, E: std::fmt::Debug>(
    name: &'static str,
    built: Result<T, E>,
) -> Result<T, FeatureError> {
    built.map_err(|e| FeatureError::Indicator {
        indicator: name,
        reason: format!("{:?}", e),
    })
}

fn ema(name: &'static str, period: usize) -> Result<ExponentialMovingAverage, FeatureError> {
    indicator(name, ExponentialMovingAverage::new(period))
}

/// Wilder smoothing (alpha = 1/n) expressed as a span-based EMA
fn wilder(name: &'static str, period: usize) -> Result<ExponentialMovingAverage, FeatureError> {
    ema(name, 2 * period - 1)
}

fn sma(name: &'static str, period: usize) -> Result<SimpleMovingAverage, FeatureError> {
    indicator(name, SimpleMovingAverage::new(period))
}

/// Values of the previous bar
#[derive(Debug, Clone, Copy)]
struct PrevBar {
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Inputs shared by every indicator family for one bar
struct Bar<'a> {
    item: &'a ta::DataItem,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    typical: f64,
    prev: Option<PrevBar>,
    first_close: f64,
    /// Recent closes, newest last, including this bar
    closes: &'a RollingWindow,
}

impl Bar<'_> {
    /// True range against the previous close (high - low on the first bar)
    fn true_range(&self) -> f64 {
        let prev_close = self.prev.map_or(self.close, |p| p.close);
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }

    fn pct_change(&self, bars: usize) -> Option<f64> {
        let past = self.closes.lag(bars)?;
        div(self.close - past, past)
    }
}

struct VolumeIndicators {
    adi: f64,
    obv: f64,
    cmf_flow: RollingWindow,
    cmf_volume: RollingWindow,
    force_index: ExponentialMovingAverage,
    ease_of_movement: RollingWindow,
    vpt: f64,
    vwap_value: RollingWindow,
    vwap_volume: RollingWindow,
    mfi: MoneyFlowIndex,
    nvi: f64,
}

impl VolumeIndicators {
    fn new() -> Result<Self, FeatureError> {
        Ok(Self {
            adi: 0.0,
            obv: 0.0,
            cmf_flow: RollingWindow::new(CMF_PERIOD),
            cmf_volume: RollingWindow::new(CMF_PERIOD),
            force_index: ema("force_index", FI_PERIOD)?,
            ease_of_movement: RollingWindow::new(EM_PERIOD),
            vpt: 0.0,
            vwap_value: RollingWindow::new(VWAP_PERIOD),
            vwap_volume: RollingWindow::new(VWAP_PERIOD),
            mfi: indicator("mfi", MoneyFlowIndex::new(MFI_PERIOD))?,
            nvi: NVI_START,
        })
    }

    fn next(&mut self, bar: &Bar<'_>, row: &mut Vec<Option<f64>>) {
        let (high, low, close, volume) = (bar.high, bar.low, bar.close, bar.volume);

        let clv = div((close - low) - (high - close), high - low).unwrap_or(0.0);
        let money_flow_volume = clv * volume;
        self.adi += money_flow_volume;

        if bar.prev.is_some_and(|p| close < p.close) {
            self.obv -= volume;
        } else {
            self.obv += volume;
        }

        self.cmf_flow.push(money_flow_volume);
        self.cmf_volume.push(volume);
        let cmf = div(self.cmf_flow.sum(), self.cmf_volume.sum());

        let force_index = bar
            .prev
            .map(|p| self.force_index.next((close - p.close) * volume));

        let ease_of_movement = bar.prev.and_then(|p| {
            div(((high - p.high) + (low - p.low)) * (high - low), 2.0 * volume)
                .map(|v| v * EM_SCALE)
        });
        if let Some(value) = ease_of_movement {
            self.ease_of_movement.push(value);
        }

        if let Some(p) = bar.prev {
            self.vpt += volume * div(close - p.close, p.close).unwrap_or(0.0);
            if volume < p.volume {
                self.nvi *= 1.0 + div(close - p.close, p.close).unwrap_or(0.0);
            }
        }

        self.vwap_value.push(bar.typical * volume);
        self.vwap_volume.push(volume);
        let vwap = div(self.vwap_value.sum(), self.vwap_volume.sum());

        row.extend([
            Some(self.adi),
            Some(self.obv),
            cmf,
            force_index,
            ease_of_movement,
            self.ease_of_movement.mean(),
            Some(self.vpt),
            vwap,
            Some(self.mfi.next(bar.item)),
            Some(self.nvi),
        ]);
    }
}

struct VolatilityIndicators {
    bb: BollingerBands,
    kc_center: SimpleMovingAverage,
    kc_high: SimpleMovingAverage,
    kc_low: SimpleMovingAverage,
    dc_high: Maximum,
    dc_low: Minimum,
    atr: WilderAtr,
    ui_max: Maximum,
    ui_squares: RollingWindow,
}

impl VolatilityIndicators {
    fn new() -> Result<Self, FeatureError> {
        Ok(Self {
            bb: indicator("bollinger", BollingerBands::new(BB_PERIOD, BB_STD_DEV))?,
            kc_center: sma("kc_center", KC_PERIOD)?,
            kc_high: sma("kc_high", KC_PERIOD)?,
            kc_low: sma("kc_low", KC_PERIOD)?,
            dc_high: indicator("donchian_high", Maximum::new(DC_PERIOD))?,
            dc_low: indicator("donchian_low", Minimum::new(DC_PERIOD))?,
            atr: WilderAtr::new(ATR_PERIOD),
            ui_max: indicator("ulcer_max", Maximum::new(UI_PERIOD))?,
            ui_squares: RollingWindow::new(UI_PERIOD),
        })
    }

    fn next(&mut self, bar: &Bar<'_>, row: &mut Vec<Option<f64>>) {
        let (high, low, close) = (bar.high, bar.low, bar.close);

        let bb = self.bb.next(close);
        let kcc = self.kc_center.next(bar.typical);
        let kch = self
            .kc_high
            .next(((4.0 * high) - (2.0 * low) + close) / 3.0);
        let kcl = self
            .kc_low
            .next(((-2.0 * high) + (4.0 * low) + close) / 3.0);
        let dch = self.dc_high.next(high);
        let dcl = self.dc_low.next(low);
        let atr = self.atr.next(bar.true_range());

        let ui_max = self.ui_max.next(close);
        let drawdown = div(close - ui_max, ui_max).unwrap_or(0.0) * 100.0;
        self.ui_squares.push(drawdown * drawdown);
        let ulcer = self
            .ui_squares
            .is_full()
            .then(|| (self.ui_squares.sum() / UI_PERIOD as f64).sqrt());

        row.extend([
            Some(bb.average),
            Some(bb.upper),
            Some(bb.lower),
            div(bb.upper - bb.lower, bb.average).map(|w| w * 100.0),
            div(close - bb.lower, bb.upper - bb.lower),
            flag(close > bb.upper),
            flag(close < bb.lower),
            Some(kcc),
            Some(kch),
            Some(kcl),
            div(kch - kcl, kcc).map(|w| w * 100.0),
            div(close - kcl, kch - kcl),
            flag(close > kch),
            flag(close < kcl),
            Some(dcl),
            Some(dch),
            Some((dch + dcl) / 2.0),
            // Bollinger middle band is the same 20-bar close average
            div(dch - dcl, bb.average).map(|w| w * 100.0),
            div(close - dcl, dch - dcl),
            Some(atr),
            ulcer,
        ]);
    }
}

struct TrendIndicators {
    macd: MovingAverageConvergenceDivergence,
    sma_fast: SimpleMovingAverage,
    sma_slow: SimpleMovingAverage,
    ema_fast: ExponentialMovingAverage,
    ema_slow: ExponentialMovingAverage,
    vortex_tr: RollingWindow,
    vortex_plus: RollingWindow,
    vortex_minus: RollingWindow,
    trix: [ExponentialMovingAverage; 3],
    trix_prev: Option<f64>,
    mass_single: ExponentialMovingAverage,
    mass_double: ExponentialMovingAverage,
    mass_sum: RollingWindow,
    dpo_sma: SimpleMovingAverage,
    kst_roc: [RollingWindow; 4],
    kst_signal: RollingWindow,
    ichimoku_high: [Maximum; 3],
    ichimoku_low: [Minimum; 3],
    visual_a: RollingWindow,
    visual_b: RollingWindow,
    stc_fast: ExponentialMovingAverage,
    stc_slow: ExponentialMovingAverage,
    stc_macd: RollingWindow,
    stc_d: ExponentialMovingAverage,
    stc_d_window: RollingWindow,
    stc_d_last: Option<f64>,
    stc_smooth: ExponentialMovingAverage,
    stc_last: Option<f64>,
    adx: ManualAdx,
    cci_window: RollingWindow,
    aroon: RollingWindow,
    psar: ParabolicSar,
}

impl TrendIndicators {
    fn new() -> Result<Self, FeatureError> {
        Ok(Self {
            macd: indicator(
                "macd",
                MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL),
            )?,
            sma_fast: sma("sma_fast", MACD_FAST)?,
            sma_slow: sma("sma_slow", MACD_SLOW)?,
            ema_fast: ema("ema_fast", MACD_FAST)?,
            ema_slow: ema("ema_slow", MACD_SLOW)?,
            vortex_tr: RollingWindow::new(VORTEX_PERIOD),
            vortex_plus: RollingWindow::new(VORTEX_PERIOD),
            vortex_minus: RollingWindow::new(VORTEX_PERIOD),
            trix: [
                ema("trix", TRIX_PERIOD)?,
                ema("trix", TRIX_PERIOD)?,
                ema("trix", TRIX_PERIOD)?,
            ],
            trix_prev: None,
            mass_single: ema("mass_index", MASS_FAST)?,
            mass_double: ema("mass_index", MASS_FAST)?,
            mass_sum: RollingWindow::new(MASS_SLOW),
            dpo_sma: sma("dpo", DPO_PERIOD)?,
            kst_roc: KST_WINDOW.map(RollingWindow::new),
            kst_signal: RollingWindow::new(KST_SIGNAL),
            ichimoku_high: [
                indicator("ichimoku", Maximum::new(ICHIMOKU_CONV))?,
                indicator("ichimoku", Maximum::new(ICHIMOKU_BASE))?,
                indicator("ichimoku", Maximum::new(ICHIMOKU_SPAN_B))?,
            ],
            ichimoku_low: [
                indicator("ichimoku", Minimum::new(ICHIMOKU_CONV))?,
                indicator("ichimoku", Minimum::new(ICHIMOKU_BASE))?,
                indicator("ichimoku", Minimum::new(ICHIMOKU_SPAN_B))?,
            ],
            visual_a: RollingWindow::new(ICHIMOKU_BASE + 1),
            visual_b: RollingWindow::new(ICHIMOKU_BASE + 1),
            stc_fast: ema("stc", STC_FAST)?,
            stc_slow: ema("stc", STC_SLOW)?,
            stc_macd: RollingWindow::new(STC_CYCLE),
            stc_d: ema("stc", STC_SMOOTH)?,
            stc_d_window: RollingWindow::new(STC_CYCLE),
            stc_d_last: None,
            stc_smooth: ema("stc", STC_SMOOTH)?,
            stc_last: None,
            adx: ManualAdx::new(ADX_PERIOD),
            cci_window: RollingWindow::new(CCI_PERIOD),
            aroon: RollingWindow::new(AROON_PERIOD),
            psar: ParabolicSar::new(),
        })
    }

    fn next(&mut self, bar: &Bar<'_>, row: &mut Vec<Option<f64>>) {
        let (high, low, close) = (bar.high, bar.low, bar.close);

        let macd = self.macd.next(close);

        // Vortex
        self.vortex_tr.push(bar.true_range());
        if let Some(p) = bar.prev {
            self.vortex_plus.push((high - p.low).abs());
            self.vortex_minus.push((low - p.high).abs());
        }
        let vortex_pos = div(self.vortex_plus.sum(), self.vortex_tr.sum());
        let vortex_neg = div(self.vortex_minus.sum(), self.vortex_tr.sum());

        // TRIX
        let single = self.trix[0].next(close);
        let double = self.trix[1].next(single);
        let triple = self.trix[2].next(double);
        let trix = self
            .trix_prev
            .and_then(|prev| div(triple - prev, prev))
            .map(|v| v * 100.0);
        self.trix_prev = Some(triple);

        // Mass index
        let amplitude_ema = self.mass_single.next(high - low);
        let amplitude_ema2 = self.mass_double.next(amplitude_ema);
        if let Some(mass) = div(amplitude_ema, amplitude_ema2) {
            self.mass_sum.push(mass);
        }

        // Detrended price oscillator
        let close_mean = self.dpo_sma.next(close);
        let dpo = bar
            .closes
            .lag(DPO_PERIOD / 2 + 1)
            .map(|past| past - close_mean);

        // Know sure thing
        let mut kst_parts = [None; 4];
        for (idx, window) in self.kst_roc.iter_mut().enumerate() {
            if let Some(roc) = bar.pct_change(KST_ROC[idx]) {
                window.push(roc);
            }
            kst_parts[idx] = window.mean();
        }
        let kst = match kst_parts {
            [Some(r1), Some(r2), Some(r3), Some(r4)] => {
                Some(100.0 * (r1 + 2.0 * r2 + 3.0 * r3 + 4.0 * r4))
            }
            _ => None,
        };
        if let Some(value) = kst {
            self.kst_signal.push(value);
        }
        let kst_sig = self.kst_signal.mean();
        let kst_diff = kst.zip(kst_sig).map(|(k, s)| k - s);

        // Ichimoku
        let [conv, base, span_b] = [0, 1, 2].map(|idx| {
            0.5 * (self.ichimoku_high[idx].next(high) + self.ichimoku_low[idx].next(low))
        });
        let span_a = 0.5 * (conv + base);
        self.visual_a.push(span_a);
        self.visual_b.push(span_b);

        // Schaff trend cycle
        let stc_macd = self.stc_fast.next(close) - self.stc_slow.next(close);
        self.stc_macd.push(stc_macd);
        let stok = self
            .stc_macd
            .min()
            .zip(self.stc_macd.max())
            .and_then(|(min, max)| div(stc_macd - min, max - min))
            .map(|v| v * 100.0);
        if let Some(k) = stok {
            self.stc_d_last = Some(self.stc_d.next(k));
        }
        let stc_input = self.stc_d_last.and_then(|d| {
            self.stc_d_window.push(d);
            self.stc_d_window
                .min()
                .zip(self.stc_d_window.max())
                .and_then(|(min, max)| div(d - min, max - min))
                .map(|v| v * 100.0)
        });
        if let Some(kd) = stc_input {
            self.stc_last = Some(self.stc_smooth.next(kd));
        }

        let adx = self.adx.next(high, low, close);

        self.cci_window.push(bar.typical);
        let cci = self
            .cci_window
            .mean()
            .zip(self.cci_window.mean_deviation())
            .and_then(|(mean, deviation)| div(bar.typical - mean, CCI_CONSTANT * deviation));

        self.aroon.push(close);
        let aroon_pct = |position: Option<usize>| {
            position.map(|p| p as f64 / AROON_PERIOD as f64 * 100.0)
        };
        let aroon_up = aroon_pct(self.aroon.extreme_position(true));
        let aroon_down = aroon_pct(self.aroon.extreme_position(false));

        let sar = self.psar.next(high, low, close);

        row.extend([
            Some(macd.macd),
            Some(macd.signal),
            Some(macd.histogram),
            Some(self.sma_fast.next(close)),
            Some(self.sma_slow.next(close)),
            Some(self.ema_fast.next(close)),
            Some(self.ema_slow.next(close)),
            vortex_pos,
            vortex_neg,
            vortex_pos.zip(vortex_neg).map(|(p, n)| p - n),
            trix,
            Some(self.mass_sum.sum()),
            dpo,
            kst,
            kst_sig,
            kst_diff,
            Some(conv),
            Some(base),
            Some(span_a),
            Some(span_b),
            self.stc_last,
            Some(adx.adx),
            Some(adx.plus_di),
            Some(adx.minus_di),
            cci,
            self.visual_a.lag(ICHIMOKU_BASE),
            self.visual_b.lag(ICHIMOKU_BASE),
            aroon_up,
            aroon_down,
            aroon_up.zip(aroon_down).map(|(u, d)| u - d),
            sar.up,
            sar.down,
            Some(sar.up_indicator),
            Some(sar.down_indicator),
        ]);
    }
}

struct MomentumIndicators {
    rsi_gain: ExponentialMovingAverage,
    rsi_loss: ExponentialMovingAverage,
    stoch_rsi: RollingWindow,
    stoch_rsi_k: RollingWindow,
    stoch_rsi_d: RollingWindow,
    tsi: [ExponentialMovingAverage; 2],
    tsi_abs: [ExponentialMovingAverage; 2],
    uo_pressure: [RollingWindow; 3],
    uo_range: [RollingWindow; 3],
    stoch: FastStochastic,
    stoch_signal: SimpleMovingAverage,
    wr_high: Maximum,
    wr_low: Minimum,
    ao_fast: SimpleMovingAverage,
    ao_slow: SimpleMovingAverage,
    ppo_fast: ExponentialMovingAverage,
    ppo_slow: ExponentialMovingAverage,
    ppo_signal: ExponentialMovingAverage,
    pvo_fast: ExponentialMovingAverage,
    pvo_slow: ExponentialMovingAverage,
    pvo_signal: ExponentialMovingAverage,
    kama_volatility: RollingWindow,
    kama: Option<f64>,
}

impl MomentumIndicators {
    fn new() -> Result<Self, FeatureError> {
        Ok(Self {
            rsi_gain: wilder("rsi", RSI_PERIOD)?,
            rsi_loss: wilder("rsi", RSI_PERIOD)?,
            stoch_rsi: RollingWindow::new(STOCH_RSI_PERIOD),
            stoch_rsi_k: RollingWindow::new(STOCH_RSI_SMOOTH),
            stoch_rsi_d: RollingWindow::new(STOCH_RSI_SMOOTH),
            tsi: [ema("tsi", TSI_SLOW)?, ema("tsi", TSI_FAST)?],
            tsi_abs: [ema("tsi", TSI_SLOW)?, ema("tsi", TSI_FAST)?],
            uo_pressure: UO_WINDOWS.map(RollingWindow::new),
            uo_range: UO_WINDOWS.map(RollingWindow::new),
            stoch: indicator("stoch", FastStochastic::new(STOCH_PERIOD))?,
            stoch_signal: sma("stoch_signal", STOCH_SIGNAL)?,
            wr_high: indicator("williams_r", Maximum::new(WR_PERIOD))?,
            wr_low: indicator("williams_r", Minimum::new(WR_PERIOD))?,
            ao_fast: sma("awesome_oscillator", AO_FAST)?,
            ao_slow: sma("awesome_oscillator", AO_SLOW)?,
            ppo_fast: ema("ppo", MACD_FAST)?,
            ppo_slow: ema("ppo", MACD_SLOW)?,
            ppo_signal: ema("ppo", MACD_SIGNAL)?,
            pvo_fast: ema("pvo", MACD_FAST)?,
            pvo_slow: ema("pvo", MACD_SLOW)?,
            pvo_signal: ema("pvo", MACD_SIGNAL)?,
            kama_volatility: RollingWindow::new(KAMA_PERIOD),
            kama: None,
        })
    }

    fn next(&mut self, bar: &Bar<'_>, row: &mut Vec<Option<f64>>) {
        let (high, low, close, volume) = (bar.high, bar.low, bar.close, bar.volume);
        let change = bar.prev.map(|p| close - p.close);

        let rsi = change.map(|diff| {
            let gain = self.rsi_gain.next(diff.max(0.0));
            let loss = self.rsi_loss.next((-diff).max(0.0));
            match div(gain, loss) {
                Some(rs) => 100.0 - 100.0 / (1.0 + rs),
                None => 100.0,
            }
        });

        let stoch_rsi = rsi.and_then(|value| {
            self.stoch_rsi.push(value);
            self.stoch_rsi
                .min()
                .zip(self.stoch_rsi.max())
                .and_then(|(min, max)| div(value - min, max - min))
        });
        if let Some(value) = stoch_rsi {
            self.stoch_rsi_k.push(value);
        }
        let stoch_rsi_k = self.stoch_rsi_k.mean();
        if let Some(value) = stoch_rsi_k {
            self.stoch_rsi_d.push(value);
        }

        let tsi = change.and_then(|diff| {
            let first = self.tsi[0].next(diff);
            let smoothed = self.tsi[1].next(first);
            let first_abs = self.tsi_abs[0].next(diff.abs());
            let smoothed_abs = self.tsi_abs[1].next(first_abs);
            div(smoothed, smoothed_abs).map(|v| v * 100.0)
        });

        let prev_close = bar.prev.map_or(close, |p| p.close);
        let true_low = low.min(prev_close);
        let buying_pressure = close - true_low;
        let true_range = high.max(prev_close) - true_low;
        let mut averages = [None; 3];
        for idx in 0..3 {
            self.uo_pressure[idx].push(buying_pressure);
            self.uo_range[idx].push(true_range);
            averages[idx] = div(self.uo_pressure[idx].sum(), self.uo_range[idx].sum());
        }
        let weight_sum: f64 = UO_WEIGHTS.iter().sum();
        let uo = match averages {
            [Some(short), Some(medium), Some(long)] => Some(
                100.0
                    * (UO_WEIGHTS[0] * short + UO_WEIGHTS[1] * medium + UO_WEIGHTS[2] * long)
                    / weight_sum,
            ),
            _ => None,
        };

        let stoch = self.stoch.next(bar.item);
        let stoch_signal = self.stoch_signal.next(stoch);

        let highest = self.wr_high.next(high);
        let lowest = self.wr_low.next(low);
        let williams_r = div(highest - close, highest - lowest).map(|v| -100.0 * v);

        let median = (high + low) / 2.0;
        let awesome = self.ao_fast.next(median) - self.ao_slow.next(median);

        let roc = bar.pct_change(ROC_PERIOD).map(|v| v * 100.0);

        let ppo_slow = self.ppo_slow.next(close);
        let ppo = div(self.ppo_fast.next(close) - ppo_slow, ppo_slow).map(|v| v * 100.0);
        let ppo_signal = ppo.map(|v| self.ppo_signal.next(v));

        let pvo_slow = self.pvo_slow.next(volume);
        let pvo = div(self.pvo_fast.next(volume) - pvo_slow, pvo_slow).map(|v| v * 100.0);
        let pvo_signal = pvo.map(|v| self.pvo_signal.next(v));

        self.kama_volatility.push(change.map_or(0.0, f64::abs));
        let reference = bar.closes.lag_or_oldest(KAMA_PERIOD).unwrap_or(close);
        let efficiency = div((close - reference).abs(), self.kama_volatility.sum()).unwrap_or(0.0);
        let fastest = 2.0 / (KAMA_FAST + 1.0);
        let slowest = 2.0 / (KAMA_SLOW + 1.0);
        let smoothing = (efficiency * (fastest - slowest) + slowest).powi(2);
        let kama = match self.kama {
            Some(prev) => prev + smoothing * (close - prev),
            None => close,
        };
        self.kama = Some(kama);

        row.extend([
            rsi,
            stoch_rsi,
            stoch_rsi_k,
            self.stoch_rsi_d.mean(),
            tsi,
            uo,
            Some(stoch),
            Some(stoch_signal),
            williams_r,
            Some(awesome),
            roc,
            ppo,
            ppo_signal,
            ppo.zip(ppo_signal).map(|(p, s)| p - s),
            pvo,
            pvo_signal,
            pvo.zip(pvo_signal).map(|(p, s)| p - s),
            Some(kama),
        ]);
    }
}

/// Streaming technical-indicator calculator.
///
/// Candles must be fed oldest first; every call yields one row in
/// [`FEATURE_NAMES`] order. A value that is not defined yet (warm-up,
/// division by zero) repeats the column's last defined value, or its
/// [`fill_value`] before the first one.
pub struct TechnicalFeatureEngineeringService {
    volume: VolumeIndicators,
    volatility: VolatilityIndicators,
    trend: TrendIndicators,
    momentum: MomentumIndicators,
    closes: RollingWindow,
    prev: Option<PrevBar>,
    first_close: Option<f64>,
    last_defined: Vec<Option<f64>>,
    defaults: Vec<f64>,
}

impl TechnicalFeatureEngineeringService {
    pub fn new() -> Result<Self, FeatureError> {
        Ok(Self {
            volume: VolumeIndicators::new()?,
            volatility: VolatilityIndicators::new()?,
            trend: TrendIndicators::new()?,
            momentum: MomentumIndicators::new()?,
            closes: RollingWindow::new(CLOSE_HISTORY),
            prev: None,
            first_close: None,
            last_defined: vec![None; FEATURE_NAMES.len()],
            defaults: FEATURE_NAMES.iter().map(|name| fill_value(name)).collect(),
        })
    }

    pub fn update(&mut self, candle: &Candle) -> Result<Vec<f64>, FeatureError> {
        let Candle {
            open,
            high,
            low,
            close,
            volume,
            ..
        } = *candle;

        // DATA ITEM for indicators needing OHLCV
        let item = match ta::DataItem::builder()
            .open(open)
            .high(high)
            .low(low)
            .close(close)
            .volume(volume)
            .build()
        {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(
                    "Failed to build DataItem at {}: {:?}. Using close price as fallback. H:{}, L:{}",
                    candle.open_time,
                    e,
                    high,
                    low
                );
                ta::DataItem::builder()
                    .open(close)
                    .high(close)
                    .low(close)
                    .close(close)
                    .volume(volume)
                    .build()
                    .map_err(|e| FeatureError::InvalidCandle {
                        open_time: candle.open_time.to_rfc3339(),
                        reason: format!("{:?}", e),
                    })?
            }
        };
        let (high, low) = (ta::High::high(&item), ta::Low::low(&item));

        self.closes.push(close);
        let first_close = *self.first_close.get_or_insert(close);
        let bar = Bar {
            item: &item,
            high,
            low,
            close,
            volume,
            typical: (high + low + close) / 3.0,
            prev: self.prev,
            first_close,
            closes: &self.closes,
        };

        let mut row = Vec::with_capacity(FEATURE_NAMES.len());
        self.volume.next(&bar, &mut row);
        self.volatility.next(&bar, &mut row);
        self.trend.next(&bar, &mut row);
        self.momentum.next(&bar, &mut row);

        // Returns
        let prev_close = bar.prev.map(|p| p.close);
        row.extend([
            prev_close
                .and_then(|p| div(close, p))
                .map(|r| (r - 1.0) * 100.0),
            prev_close
                .filter(|p| *p > 0.0 && close > 0.0)
                .map(|p| (close.ln() - p.ln()) * 100.0),
            div(close, bar.first_close).map(|r| (r - 1.0) * 100.0),
        ]);
        debug_assert_eq!(row.len(), FEATURE_NAMES.len());

        self.prev = Some(PrevBar {
            high,
            low,
            close,
            volume,
        });

        Ok(row
            .into_iter()
            .enumerate()
            .map(|(idx, value)| match value.filter(|v| v.is_finite()) {
                Some(v) => {
                    self.last_defined[idx] = Some(v);
                    v
                }
                None => self.last_defined[idx].unwrap_or(self.defaults[idx]),
            })
            .collect())
    }
}

/// Indicator values for a batch of candles, one row per candle.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    data: Array2<f64>,
}

impl FeatureTable {
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        FEATURE_NAMES
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        feature_index(name).map(|idx| self.data.column(idx))
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn to_f32(&self) -> Array2<f32> {
        self.data.mapv(|v| v as f32)
    }
}

/// Compute the feature table for candles in ascending time order.
pub fn build_feature_table(candles: &[Candle]) -> Result<FeatureTable, FeatureError> {
    let mut service = TechnicalFeatureEngineeringService::new()?;
    let mut flat = Vec::with_capacity(candles.len() * FEATURE_NAMES.len());
    for candle in candles {
        flat.extend(service.update(candle)?);
    }

    let data = Array2::from_shape_vec((candles.len(), FEATURE_NAMES.len()), flat).map_err(|e| {
        FeatureError::Indicator {
            indicator: "feature_table",
            reason: e.to_string(),
        }
    })?;
    Ok(FeatureTable { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(count: usize) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.2;
                Candle {
                    open_time: base + Duration::minutes(i as i64),
                    open: close - 0.3,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 10.0 + (i % 7) as f64,
                }
            })
            .collect()
    }

    #[test]
    fn test_table_shape_matches_registry() {
        let table = build_feature_table(&candles(50)).unwrap();
        assert_eq!(table.rows(), 50);
        assert_eq!(table.values().ncols(), FEATURE_NAMES.len());
        assert_eq!(table.columns().len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_all_values_are_finite() {
        let table = build_feature_table(&candles(50)).unwrap();
        assert!(table.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_single_candle_is_finite() {
        let table = build_feature_table(&candles(1)).unwrap();
        assert_eq!(table.rows(), 1);
        assert!(table.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_empty_batch_yields_empty_table() {
        let table = build_feature_table(&[]).unwrap();
        assert_eq!(table.rows(), 0);
    }

    #[test]
    fn test_bounded_oscillators() {
        let table = build_feature_table(&candles(50)).unwrap();
        for name in [
            "momentum_rsi",
            "volume_mfi",
            "momentum_stoch",
            "trend_aroon_up",
            "trend_aroon_down",
            "trend_stc",
        ] {
            let column = table.column(name).unwrap();
            assert!(
                column.iter().all(|v| (0.0..=100.0).contains(v)),
                "{} out of range",
                name
            );
        }
        let wr = table.column("momentum_wr").unwrap();
        assert!(wr.iter().all(|v| (-100.0..=0.0).contains(v)));
        let stoch_rsi = table.column("momentum_stoch_rsi").unwrap();
        assert!(stoch_rsi.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_warm_up_uses_fill_values() {
        let table = build_feature_table(&candles(3)).unwrap();
        // No change on the first bar, so RSI has nothing to smooth yet
        assert_eq!(table.column("momentum_rsi").unwrap()[0], 50.0);
        assert_eq!(table.column("others_dr").unwrap()[0], 0.0);
        assert_eq!(table.column("trend_dpo").unwrap()[2], 0.0);
        assert_eq!(table.column("volume_nvi").unwrap()[0], NVI_START);
    }

    #[test]
    fn test_atr_waits_for_a_full_window() {
        let table = build_feature_table(&candles(12)).unwrap();
        let atr = table.column("volatility_atr").unwrap();
        assert!(atr.iter().take(ATR_PERIOD - 1).all(|v| *v == 0.0));
        assert!(atr[ATR_PERIOD - 1] > 0.0);
    }

    #[test]
    fn test_visual_ichimoku_is_shifted_span() {
        let table = build_feature_table(&candles(40)).unwrap();
        let span_a = table.column("trend_ichimoku_a").unwrap();
        let visual_a = table.column("trend_visual_ichimoku_a").unwrap();
        for i in ICHIMOKU_BASE..40 {
            assert_eq!(visual_a[i], span_a[i - ICHIMOKU_BASE]);
        }
        assert_eq!(visual_a[0], 0.0);
    }

    #[test]
    fn test_kst_defined_after_slowest_roc() {
        let table = build_feature_table(&candles(40)).unwrap();
        let kst = table.column("trend_kst").unwrap();
        assert!(kst.iter().take(KST_ROC[3]).all(|v| *v == 0.0));
        assert!(kst[KST_ROC[3]] != 0.0);
    }

    #[test]
    fn test_psar_indicators_are_flags() {
        let table = build_feature_table(&candles(50)).unwrap();
        for name in ["trend_psar_up_indicator", "trend_psar_down_indicator"] {
            let column = table.column(name).unwrap();
            assert!(column.iter().all(|v| *v == 0.0 || *v == 1.0));
        }
        let up = table.column("trend_psar_up_indicator").unwrap();
        assert_eq!(up[2], 1.0);
    }

    #[test]
    fn test_cumulative_return_tracks_first_close() {
        let input = candles(30);
        let table = build_feature_table(&input).unwrap();
        let cr = table.column("others_cr").unwrap();
        assert_eq!(cr[0], 0.0);
        let expected = (input[29].close / input[0].close - 1.0) * 100.0;
        assert!((cr[29] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_order_matters() {
        let ascending = candles(40);
        let mut descending = ascending.clone();
        descending.reverse();

        let forward = build_feature_table(&ascending).unwrap();
        let backward = build_feature_table(&descending).unwrap();
        let last_forward = forward.column("momentum_rsi").unwrap()[39];
        let last_backward = backward.column("momentum_rsi").unwrap()[39];
        assert!((last_forward - last_backward).abs() > 1e-6);
    }

    #[test]
    fn test_inconsistent_candle_falls_back_to_close() {
        let mut input = candles(5);
        input[2].high = input[2].low - 1.0;
        let table = build_feature_table(&input).unwrap();
        assert!(table.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_adx_warms_up_after_period() {
        let mut adx = ManualAdx::new(3);
        assert_eq!(adx.next(10.0, 9.0, 9.5).adx, 0.0);
        adx.next(11.0, 9.5, 10.5);
        adx.next(12.0, 10.5, 11.5);
        let output = adx.next(13.0, 11.5, 12.5);
        assert!(output.adx > 0.0);
        assert!(output.plus_di > output.minus_di);
    }

    #[test]
    fn test_rolling_window_lag_and_extremes() {
        let mut window = RollingWindow::new(3);
        for value in [4.0, 9.0, 1.0, 7.0] {
            window.push(value);
        }
        assert_eq!(window.lag(0), Some(7.0));
        assert_eq!(window.lag(2), Some(9.0));
        assert_eq!(window.lag(3), None);
        assert_eq!(window.lag_or_oldest(5), Some(9.0));
        assert_eq!(window.extreme_position(true), Some(1));
        assert_eq!(window.extreme_position(false), Some(2));
    }
}
