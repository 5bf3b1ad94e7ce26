use std::collections::BTreeSet;
use std::ops::RangeInclusive;

pub const DEFAULT_SLOTS_PER_PAGE: u32 = 16;

/// Geometry of a generated binder.
///
/// Slide 0 shows the cover next to page 1; every later slide `i` shows pages
/// `2i` and `2i + 1`, so the last sheet may carry an empty placeholder page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinderLayout {
    total_slots: u32,
    slots_per_page: u32,
    total_pages: u32,
    total_slides: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSide {
    Front,
    Back,
}

impl BinderLayout {
    pub fn new(total_slots: u32, slots_per_page: u32) -> Self {
        let slots_per_page = slots_per_page.max(1);
        let total_pages = total_slots.div_ceil(slots_per_page);

        Self {
            total_slots,
            slots_per_page,
            total_pages,
            total_slides: total_pages.div_ceil(2) + 1,
        }
    }

    pub fn total_slots(&self) -> u32 {
        self.total_slots
    }

    pub fn slots_per_page(&self) -> u32 {
        self.slots_per_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_slides(&self) -> u32 {
        self.total_slides
    }

    pub fn clamp_slide(&self, slide: u32) -> u32 {
        slide.min(self.total_slides.saturating_sub(1))
    }

    /// Page numbers a slide is made of, including ones past the last page
    /// (but never past `u32::MAX`).
    pub fn slide_pages(slide: u32) -> Vec<u32> {
        if slide == 0 {
            vec![1]
        } else {
            [slide.checked_mul(2), slide.checked_mul(2).and_then(|p| p.checked_add(1))]
                .into_iter()
                .flatten()
                .collect()
        }
    }

    pub fn first_page_of_slide(slide: u32) -> u32 {
        if slide == 0 { 1 } else { slide.saturating_mul(2) }
    }

    pub fn page_exists(&self, page: u32) -> bool {
        page >= 1 && page <= self.total_pages
    }

    pub fn page_slots(&self, page: u32) -> RangeInclusive<u32> {
        if !self.page_exists(page) {
            return 1..=0;
        }
        // page <= total_pages keeps start within total_slots; only end can overflow
        let start = (page - 1) * self.slots_per_page + 1;
        let end = page
            .saturating_mul(self.slots_per_page)
            .min(self.total_slots);
        start..=end
    }

    pub fn page_of_slot(&self, slot: u32) -> u32 {
        slot.div_ceil(self.slots_per_page)
    }

    pub fn slide_for_slot(&self, slot: u32) -> u32 {
        let page = self.page_of_slot(slot);
        if page <= 1 { 0 } else { (page - 1).div_ceil(2) }
    }

    pub fn sheet_of_page(page: u32) -> (u32, PageSide) {
        let side = if page % 2 == 1 {
            PageSide::Front
        } else {
            PageSide::Back
        };
        (page.div_ceil(2), side)
    }

    /// Slots shown on a slide, in reading order.
    pub fn slide_slots(&self, slide: u32) -> Vec<u32> {
        Self::slide_pages(slide)
            .into_iter()
            .flat_map(|page| self.page_slots(page))
            .collect()
    }

    /// Pages that must be resident while `slide` is on screen: the slide itself
    /// plus `depth` slides on either side. Depth is capped at the slide count.
    pub fn resident_pages(&self, slide: u32, depth: u32) -> BTreeSet<u32> {
        let mut pages: BTreeSet<u32> = Self::slide_pages(slide).into_iter().collect();

        for k in 1..=depth.min(self.total_slides) {
            if let Some(ahead) = slide.checked_add(k).filter(|s| *s < self.total_slides) {
                pages.extend(Self::slide_pages(ahead));
            }
            match slide.checked_sub(k) {
                Some(0) => {
                    pages.insert(1);
                }
                Some(behind) => pages.extend(Self::slide_pages(behind)),
                None => {}
            }
        }

        pages.retain(|page| self.page_exists(*page));
        pages
    }

    pub fn resident_ids(&self, slide: u32, depth: u32) -> Vec<u32> {
        self.resident_pages(slide, depth)
            .into_iter()
            .flat_map(|page| self.page_slots(page))
            .collect()
    }
}
