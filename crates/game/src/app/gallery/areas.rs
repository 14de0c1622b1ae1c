use engine::Rect;

/// An exhibit spot on the map. Walking into `bounds` opens its carousel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct InteractionArea {
    pub(crate) name: &'static str,
    pub(crate) bounds: Rect,
    pub(crate) description: &'static str,
    pub(crate) image_set: &'static str,
}

/// Inclusive `wechat_<n>.jpg` range for each image set.
struct ImageRange {
    image_set: &'static str,
    first: u32,
    last: u32,
}

const IMAGE_ROOT: &str = "第一层";

pub(crate) const AREAS: [InteractionArea; 5] = [
    InteractionArea {
        name: "八国联军侵华",
        bounds: Rect::new(650.0, 200.0, 120.0, 80.0),
        description: "1900年，八国联军侵华战争爆发，这是中国近代史上的一次重大屈辱事件。八个帝国主义国家联合入侵中国，攻占北京，烧杀抢掠，给中华民族带来了深重的灾难。",
        image_set: "八国联军侵华",
    },
    InteractionArea {
        name: "帝国末路",
        bounds: Rect::new(400.0, 130.0, 120.0, 80.0),
        description: "清朝末年，封建帝制已经走到了历史的尽头。政治腐败、经济凋敝、民不聊生，各种社会矛盾日益尖锐，为辛亥革命的爆发创造了条件。",
        image_set: "帝国末路",
    },
    InteractionArea {
        name: "救亡图存",
        bounds: Rect::new(100.0, 250.0, 120.0, 80.0),
        description: "面对民族危机，无数仁人志士开始探索救国救民的道路。从洋务运动到维新变法，从太平天国到义和团运动，中华民族在黑暗中寻找光明。",
        image_set: "救亡图存",
    },
    InteractionArea {
        name: "甲午海战",
        bounds: Rect::new(250.0, 350.0, 120.0, 80.0),
        description: "1894年甲午中日战争，北洋海军全军覆没，《马关条约》的签订标志着洋务运动的失败，也进一步激发了中国民族的觉醒。",
        image_set: "甲午海战",
    },
    InteractionArea {
        name: "革命原起",
        bounds: Rect::new(450.0, 450.0, 120.0, 80.0),
        description: "孙中山先生创立兴中会、同盟会，提出三民主义，发动了一系列武装起义。辛亥革命的思想基础和组织基础逐步形成。",
        image_set: "革命原起",
    },
];

const IMAGE_RANGES: [ImageRange; 5] = [
    ImageRange {
        image_set: "八国联军侵华",
        first: 31,
        last: 48,
    },
    ImageRange {
        image_set: "帝国末路",
        first: 17,
        last: 22,
    },
    ImageRange {
        image_set: "救亡图存",
        first: 49,
        last: 73,
    },
    ImageRange {
        image_set: "甲午海战",
        first: 23,
        last: 30,
    },
    ImageRange {
        image_set: "革命原起",
        first: 74,
        last: 126,
    },
];

/// Index of the first area in registry order that overlaps `rect`.
pub(crate) fn first_overlapping(areas: &[InteractionArea], rect: &Rect) -> Option<usize> {
    areas.iter().position(|area| area.bounds.overlaps(rect))
}

/// Asset locators for an image set in source order. Unknown sets have none.
pub(crate) fn image_locators(image_set: &str) -> Vec<String> {
    IMAGE_RANGES
        .iter()
        .find(|range| range.image_set == image_set)
        .map(|range| {
            (range.first..=range.last)
                .map(|n| format!("{IMAGE_ROOT}/{image_set}/wechat_{n}.jpg"))
                .collect()
        })
        .unwrap_or_default()
}
