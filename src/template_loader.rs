//! Registration of templates into the global [`TEMPLATES`] cache.

use std::sync::Arc;

use crate::error::Result;
use crate::tpl::cache::{TEMPLATES, Template};
use crate::tpl::watcher::Watcher;

/// 加载指定模式（glob pattern）匹配的所有模板文件
///
/// # 参数
/// * `pattern` - 文件路径匹配模式，例如 "templates/**/*.html"
pub fn load(pattern: &str) -> Result<usize> {
    TEMPLATES.load(pattern)
}

/// 加载内嵌的模板资源（通常由 `template_assets!` 编译进二进制）
///
/// 单个模板编译失败不会影响其余模板的注册；返回成功注册的数量
pub fn load_assets(assets: Vec<(&str, &str)>) -> Result<usize> {
    TEMPLATES.load_assets(assets)
}

/// 根据模板标识（文件路径或内嵌资源路径）查找已编译的模板
pub fn find_template(identity: &str) -> Option<Arc<Template>> {
    TEMPLATES.get(identity)
}

/// 对全局缓存中的文件模板启用热加载；返回值被 drop 时停止
pub fn watch() -> Watcher {
    Watcher::spawn(&*TEMPLATES)
}

/// 清理所有已加载的模板（主要用于测试环境重置状态）
pub fn clear() {
    TEMPLATES.clear();
}
