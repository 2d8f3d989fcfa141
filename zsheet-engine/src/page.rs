//! 单页生成：布局命名、打印设置与适配内容的锁定视口。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};
use zsheet_config::PlotConfig;
use zsheet_core::document::{PageId, PaperUnits, ViewState, ViewportId, ViewportScale};
use zsheet_core::geometry::{Bounds2D, Point2, Vector3, approx_eq};
use zsheet_core::sheet::{Orientation, PageRequest};

use crate::errors::EngineError;
use crate::host::{Host, PaperPreset, ViewportSettings, with_transaction};

const VIEWPORT_LAYER: &str = "Defpoints";
const VIEWPORT_COLOR: i16 = 252;
const VIEWPORT_LINE_WEIGHT: i16 = 0;

static NAME_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \(\d+\)").expect("page name suffix pattern"));

/// 生成不与 `existing` 重名的布局名并登记进去。
///
/// 重名时先去掉已有的 ` (n)` 后缀再追加新的序号，从 2 开始。
pub fn unique_page_name(requested: &str, existing: &mut Vec<String>) -> String {
    let mut name = requested.to_string();
    let mut index = 2;
    while existing.contains(&name) {
        let stripped = NAME_SUFFIX.replace_all(&name, "");
        name = format!("{stripped} ({index})");
        index += 1;
    }
    existing.push(name.clone());
    name
}

/// 视口内容适配结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportFit {
    pub view_center: Point2,
    pub view_height: f64,
    pub custom_scale: f64,
}

/// 以内容范围中心为视图中心；内容比视口更扁时按视口宽高比放大视图高度。
pub fn fit_viewport(
    extents: &Bounds2D,
    viewport_width: f64,
    viewport_height: f64,
    factor: f64,
) -> Option<ViewportFit> {
    let width = extents.width();
    let mut height = extents.height();
    if extents.is_empty() || height <= 0.0 || viewport_width <= 0.0 || viewport_height <= 0.0 {
        return None;
    }
    let aspect = viewport_width / viewport_height;
    if width / height > aspect {
        height = width / aspect;
    }
    Some(ViewportFit {
        view_center: extents.center(),
        view_height: height,
        custom_scale: viewport_height / height * factor,
    })
}

/// 与 1:1 相差不足 `tolerance` 时标注为精确 1:1。
pub fn snap_scale(custom_scale: f64, tolerance: f64) -> ViewportScale {
    if approx_eq(custom_scale, 1.0, tolerance) {
        ViewportScale::OneToOne
    } else {
        ViewportScale::Custom(custom_scale)
    }
}

/// 生成结果。
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPage {
    pub page: PageId,
    pub viewport: ViewportId,
    pub name: String,
    pub scale: ViewportScale,
}

/// 按打印配置为每个区域生成一张布局。
#[derive(Debug, Clone)]
pub struct PageGenerator {
    plot: PlotConfig,
}

impl PageGenerator {
    pub fn new(plot: PlotConfig) -> Self {
        Self { plot }
    }

    /// 按方向选择图纸，设备、图纸与样式表只在宿主列出时才应用。
    pub fn paper_preset(&self, host: &dyn Host, orientation: Orientation) -> PaperPreset {
        let media = match orientation {
            Orientation::Landscape => &self.plot.landscape_media,
            Orientation::Portrait => &self.plot.portrait_media,
        };
        let pick = |wanted: &String, available: Vec<String>, what: &str| {
            if available.contains(wanted) {
                Some(wanted.clone())
            } else {
                warn!(wanted = %wanted, what, "宿主未提供该打印项，保持默认");
                None
            }
        };
        PaperPreset {
            device: pick(&self.plot.device, host.list_available_devices(), "device"),
            media: pick(media, host.list_available_sizes(), "media"),
            style_sheet: pick(
                &self.plot.style_sheet,
                host.list_available_styles(),
                "style_sheet",
            ),
        }
    }

    /// 在一次事务中创建布局与视口；任何一步失败都回滚整页并返回 `GenerationFailed`。
    pub fn generate(
        &self,
        host: &mut dyn Host,
        request: &PageRequest,
    ) -> Result<GeneratedPage, EngineError> {
        with_transaction(host, |host| self.build(host, request))
    }

    fn build(&self, host: &mut dyn Host, request: &PageRequest) -> Result<GeneratedPage, EngineError> {
        let mut existing = host.list_existing_page_names();
        let name = unique_page_name(&request.name, &mut existing);

        let page = host
            .create_page(&name)
            .ok_or_else(|| EngineError::generation(&name, "layout creation rejected"))?;
        if !host.set_current_page(&name) {
            debug!(name = %name, "无法切换到新布局");
        }

        for (viewport, bounds) in host.page_viewports(page) {
            if bounds.min() != Point2::ORIGIN {
                host.erase_viewport(page, viewport);
            }
        }

        let preset = self.paper_preset(&*host, request.orientation);
        host.set_paper_preset(page, &preset)?;
        host.set_print_area(page, request.extents, PaperUnits::Millimeters)?;

        let paper = host
            .media_size(page)
            .ok_or_else(|| EngineError::generation(&name, "paper size unavailable"))?;
        let (width, height) = (paper.y(), paper.x());
        let fit = fit_viewport(&request.extents, width, height, self.plot.fit_factor)
            .ok_or_else(|| EngineError::generation(&name, "degenerate extents"))?;

        let viewport = host
            .create_viewport(page)
            .ok_or_else(|| EngineError::generation(&name, "viewport creation rejected"))?;
        let center = Point2::new(width * 0.5, height * 0.5);
        let scale = snap_scale(fit.custom_scale, self.plot.scale_snap_tolerance);
        host.configure_viewport(
            viewport,
            &ViewportSettings {
                center,
                width,
                height,
                view_center: fit.view_center,
                view_height: fit.view_height,
                custom_scale: fit.custom_scale,
                scale,
                view_direction: Vector3::UNIT_Z,
                is_on: true,
                is_locked: true,
                layer: VIEWPORT_LAYER.to_string(),
                color_index: VIEWPORT_COLOR,
                line_weight: VIEWPORT_LINE_WEIGHT,
            },
        )?;
        host.set_current_view(ViewState {
            center,
            width,
            height,
        });

        info!(name = %name, ?scale, "已生成布局");
        Ok(GeneratedPage {
            page,
            viewport,
            name,
            scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use zsheet_core::document::SpaceMode;

    use super::*;
    use crate::host::PageService;
    use crate::session::Session;

    fn request(name: &str, width: f64, height: f64) -> PageRequest {
        let extents = Bounds2D::new(Point2::new(1000.0, 0.0), Point2::new(1000.0 + width, height));
        PageRequest {
            name: name.to_string(),
            orientation: Orientation::for_extents(&extents),
            extents,
        }
    }

    #[test]
    fn unique_names_converge_instead_of_compounding() {
        let mut existing = Vec::new();
        assert_eq!(unique_page_name("3", &mut existing), "3");
        assert_eq!(unique_page_name("3", &mut existing), "3 (2)");
        assert_eq!(unique_page_name("3", &mut existing), "3 (3)");
        assert_eq!(unique_page_name("3 (2)", &mut existing), "3 (4)");
        assert_eq!(existing.len(), 4);
    }

    #[test]
    fn scale_snaps_only_near_one() {
        assert_eq!(snap_scale(1.05, 0.1), ViewportScale::OneToOne);
        assert_eq!(snap_scale(0.95, 0.1), ViewportScale::OneToOne);
        assert_eq!(snap_scale(1.2, 0.1), ViewportScale::Custom(1.2));
    }

    #[test]
    fn wide_content_inflates_view_height() {
        let extents = Bounds2D::new(Point2::ORIGIN, Point2::new(400.0, 100.0));
        let fit = fit_viewport(&extents, 297.0, 210.0, 1.0).expect("fit");
        assert_eq!(fit.view_center, Point2::new(200.0, 50.0));
        let expected = 400.0 / (297.0 / 210.0);
        assert!((fit.view_height - expected).abs() < 1e-9);
        assert!((fit.custom_scale - 210.0 / expected).abs() < 1e-9);

        let tall = Bounds2D::new(Point2::ORIGIN, Point2::new(210.0, 297.0));
        let fit = fit_viewport(&tall, 210.0, 297.0, 1.0).expect("fit");
        assert!((fit.custom_scale - 1.0).abs() < 1e-9);

        let flat = Bounds2D::new(Point2::ORIGIN, Point2::new(10.0, 0.0));
        assert!(fit_viewport(&flat, 210.0, 297.0, 1.0).is_none());
    }

    #[test]
    fn generates_locked_viewport_on_landscape_page() {
        let mut session = Session::new();
        let generator = PageGenerator::new(PlotConfig::default());
        let generated = generator
            .generate(&mut session, &request("7", 297.0, 210.0))
            .expect("generate");
        assert_eq!(generated.name, "7");
        assert_eq!(generated.scale, ViewportScale::OneToOne);

        let doc = session.document();
        let layout = doc.layout(generated.page).expect("layout");
        assert_eq!(
            layout.plot.media.as_deref(),
            Some("ISO_full_bleed_A4_(210.00_x_297.00_MM)")
        );
        assert_eq!(layout.plot.device.as_deref(), Some("DWG To PDF.pc3"));
        assert_eq!(layout.plot.style_sheet.as_deref(), Some("monochrome.ctb"));
        assert_eq!(layout.plot.paper_units, PaperUnits::Millimeters);
        assert!(layout.plot.use_standard_scale);
        assert_eq!(layout.viewports.len(), 2);

        let viewport = doc.viewport(generated.viewport).expect("viewport");
        assert_eq!(viewport.layer, "Defpoints");
        assert_eq!(viewport.color_index, 252);
        assert!(viewport.is_on && viewport.is_locked);
        assert_eq!((viewport.width, viewport.height), (297.0, 210.0));
        assert_eq!(viewport.center, Point2::new(148.5, 105.0));
        assert_eq!(viewport.view_center, Point2::new(1148.5, 105.0));
        assert_eq!(doc.view().center, Point2::new(148.5, 105.0));
        assert_eq!(doc.current_layout(), Some("7"));
        assert_eq!(doc.space(), SpaceMode::Model);
    }

    #[test]
    fn missing_catalog_entries_are_skipped() {
        let mut session = Session::new();
        session.document_mut().plot_catalog_mut().devices.clear();
        let generator = PageGenerator::new(PlotConfig::default());
        let generated = generator
            .generate(&mut session, &request("1", 100.0, 400.0))
            .expect("generate");
        let layout = session.document().layout(generated.page).expect("layout");
        assert_eq!(layout.plot.device, None);
        assert_eq!(
            layout.plot.media.as_deref(),
            Some("ISO_full_bleed_A4_(297.00_x_210.00_MM)")
        );
        assert!(matches!(generated.scale, ViewportScale::Custom(_)));
    }

    #[test]
    fn rejected_layout_rolls_back_and_reports() {
        let mut session = Session::new();
        session.reject_page_name("5");
        let generator = PageGenerator::new(PlotConfig::default());
        let err = generator
            .generate(&mut session, &request("5", 297.0, 210.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailed { ref name, .. } if name == "5"));
        assert!(!err.is_fatal());
        assert!(session.list_existing_page_names().is_empty());
    }
}
