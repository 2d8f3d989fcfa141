//! 网格排序：自上而下、自左而右地为区域分配行列号。

use zsheet_config::GridConfig;
use zsheet_core::geometry::{Point2, approx_eq};
use zsheet_core::sheet::GridLocator;

/// 区域中心点的排序规则：Y 降序分行，行内 X 升序。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOrder {
    row_epsilon: f64,
    column_epsilon: f64,
    exact: bool,
}

impl GridOrder {
    pub fn new(row_epsilon: f64, column_epsilon: f64) -> Self {
        Self {
            row_epsilon,
            column_epsilon,
            exact: false,
        }
    }

    /// 精确比较模式。
    pub fn exact() -> Self {
        Self {
            row_epsilon: 0.0,
            column_epsilon: 0.0,
            exact: true,
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        if config.exact {
            Self::exact()
        } else {
            Self::new(config.row_epsilon, config.column_epsilon)
        }
    }

    #[inline]
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// 两个 Y 坐标是否属于同一行：差值小于行容差（精确模式下必须相等）。
    pub fn same_row(&self, previous_y: f64, y: f64) -> bool {
        self.same_band(previous_y, y, self.row_epsilon)
    }

    /// 同一行内两个 X 坐标是否并列：差值小于列容差（精确模式下必须相等）。
    pub fn same_column(&self, previous_x: f64, x: f64) -> bool {
        self.same_band(previous_x, x, self.column_epsilon)
    }

    fn same_band(&self, previous: f64, value: f64, epsilon: f64) -> bool {
        if self.exact {
            previous == value
        } else {
            approx_eq(previous, value, epsilon)
        }
    }

    /// 按访问顺序排列候选项并分配定位：行号从 0 开始，每换一行列号归零。
    ///
    /// 先按 Y 精确降序排列，相邻两项不在同一行时开新行；行的划分沿用上一项的 Y 值，
    /// 因此缓慢漂移的一排仍算作同一行。行内按 X 升序，X 在列容差内并列的一组按 Y 降序。
    pub fn arrange<T>(&self, mut items: Vec<(Point2, T)>) -> Vec<(GridLocator, T)> {
        items.sort_by(|a, b| b.0.y().total_cmp(&a.0.y()));

        let mut arranged = Vec::new();
        let rows = chain_bands(items, |prev, next| self.same_row(prev.y(), next.y()));
        for (row_index, mut row) in rows.into_iter().enumerate() {
            row.sort_by(|a, b| a.0.x().total_cmp(&b.0.x()));
            let columns = chain_bands(row, |prev, next| self.same_column(prev.x(), next.x()));
            let ordered = columns.into_iter().flat_map(|mut tied| {
                tied.sort_by(|a, b| b.0.y().total_cmp(&a.0.y()).then(a.0.x().total_cmp(&b.0.x())));
                tied
            });
            for (column_index, (_, item)) in ordered.enumerate() {
                arranged.push((
                    GridLocator::new(row_index as i32, column_index as i32, 0),
                    item,
                ));
            }
        }
        arranged
    }
}

/// 把已排序的序列切成若干段：相邻两项满足 `joins` 时留在同一段。
fn chain_bands<T>(
    items: Vec<(Point2, T)>,
    joins: impl Fn(Point2, Point2) -> bool,
) -> Vec<Vec<(Point2, T)>> {
    let mut bands: Vec<Vec<(Point2, T)>> = Vec::new();
    let mut previous: Option<Point2> = None;
    for (center, item) in items {
        if previous.is_none_or(|prev| !joins(prev, center)) {
            bands.push(Vec::new());
        }
        if let Some(band) = bands.last_mut() {
            band.push((center, item));
        }
        previous = Some(center);
    }
    bands
}

impl Default for GridOrder {
    fn default() -> Self {
        Self::from_config(&GridConfig::default())
    }
}
